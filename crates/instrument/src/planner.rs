//! The walker/planner.
//!
//! One pass over the normalized AST that assigns 1-based monotonic ids to
//! functions, statements and branches, records the static location maps, and
//! schedules injection directives keyed by byte offset. The planner never
//! edits text itself; the injector applies the directives afterwards.

use crate::{
    unit::{BranchKind, BranchRecord, ContractUnit, Directive, FunctionRecord, Scope, SourceRange},
    InstrumentConfig,
};
use alloy_primitives::{hex, keccak256};
use solang_parser::pt::{self, CodeLocation};

pub(crate) fn plan(ast: &pt::SourceUnit, unit: &mut ContractUnit, config: &InstrumentConfig) {
    Planner { unit, config, file_scope: None }.plan_source_unit(ast);
}

struct Planner<'a> {
    unit: &'a mut ContractUnit,
    config: &'a InstrumentConfig,
    /// Lazily created scope for file-level free functions.
    file_scope: Option<usize>,
}

/// Where a ternary's value ends up, deciding the tuple-assignment rewrite.
enum TernaryTarget<'a> {
    /// `type x = <ternary>;` becomes `type x; (, x) = <ternary>;`.
    Declaration(&'a pt::Identifier),
    /// `x = <ternary>;` becomes `(, x) = <ternary>;`.
    Assignment(&'a pt::Identifier),
    /// A bare ternary statement; only the arms are rewritten.
    None,
}

impl Planner<'_> {
    fn plan_source_unit(&mut self, ast: &pt::SourceUnit) {
        for part in &ast.0 {
            match part {
                pt::SourceUnitPart::ContractDefinition(def) => self.plan_contract(def),
                pt::SourceUnitPart::FunctionDefinition(func) => {
                    let scope = self.ensure_file_scope(func.loc.start());
                    self.plan_function(func, scope);
                }
                // Pragmas, imports, type/struct/event declarations and the
                // like carry no executable code.
                _ => {}
            }
        }
    }

    fn plan_contract(&mut self, def: &pt::ContractDefinition) {
        let name = def.name.as_ref().map(|n| n.name.clone()).unwrap_or_default();
        if matches!(def.ty, pt::ContractTy::Interface(_)) {
            trace!(contract = %name, "skipping interface");
            return;
        }
        let has_bodies = def.parts.iter().any(|part| {
            matches!(part, pt::ContractPart::FunctionDefinition(f) if f.body.is_some())
        });
        if !has_bodies {
            return;
        }

        let suffix = scope_suffix(self.unit, &name);
        let scope =
            self.unit.push_scope(Scope { name: name.clone(), suffix, file_scoped: false });

        // Helper declarations go just inside the contract's opening brace.
        let header = &self.unit.source[def.loc.start()..def.loc.end()];
        let Some(brace) = header.find('{') else { return };
        self.push(def.loc.start() + brace + 1, Directive::HashMethods { scope });

        for part in &def.parts {
            if let pt::ContractPart::FunctionDefinition(func) = part {
                self.plan_function(func, scope);
            }
        }
    }

    fn ensure_file_scope(&mut self, offset: usize) -> usize {
        if let Some(scope) = self.file_scope {
            return scope;
        }
        let suffix = scope_suffix(self.unit, "");
        let scope = self.unit.push_scope(Scope {
            name: String::new(),
            suffix,
            file_scoped: true,
        });
        // File-level helpers are declared once, ahead of the first free
        // function encountered.
        self.push(offset, Directive::HashMethods { scope });
        self.file_scope = Some(scope);
        scope
    }

    fn plan_function(&mut self, func: &pt::FunctionDefinition, scope: usize) {
        // Bodyless signatures (interface members, abstract declarations) get
        // no probes at all.
        let Some(body) = &func.body else { return };
        let pt::Statement::Block { loc: body_loc, statements, .. } = body else { return };

        if self.config.measure_function_coverage {
            let id = self.unit.alloc_function_id();
            let name = func
                .name
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_else(|| func.ty.to_string());
            let line = self.unit.index.position(func.loc.start()).line;
            let loc = self.range_of(func.loc);
            self.unit.function_map.insert(id, FunctionRecord { name, line, loc });
            self.push(body_loc.start() + 1, Directive::Function { id, scope });
        }

        // The implicit receive/fallback paths are counted as functions but
        // excluded from statement tracking to avoid distorting their cost.
        if matches!(func.ty, pt::FunctionTy::Receive | pt::FunctionTy::Fallback) {
            return;
        }

        for stmt in statements {
            self.plan_statement(stmt, scope);
        }
    }

    fn plan_statement(&mut self, stmt: &pt::Statement, scope: usize) {
        match stmt {
            pt::Statement::Block { statements, .. } => {
                for stmt in statements {
                    self.plan_statement(stmt, scope);
                }
            }
            pt::Statement::If(loc, cond, cons, alt) => {
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
                self.plan_condition(cond, scope);
                self.plan_if_branch(*loc, cons, alt.as_deref(), scope);
                self.plan_statement(cons, scope);
                if let Some(alt) = alt {
                    self.plan_statement(alt, scope);
                }
            }
            pt::Statement::While(loc, cond, body) => {
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
                self.plan_condition(cond, scope);
                self.plan_statement(body, scope);
            }
            pt::Statement::For(loc, _init, cond, _update, body) => {
                // The header is left untouched; the probe ahead of the `for`
                // counts arrivals at the loop test.
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
                if let Some(cond) = cond {
                    self.plan_condition(cond, scope);
                }
                if let Some(body) = body {
                    self.plan_statement(body, scope);
                }
            }
            pt::Statement::DoWhile(loc, body, cond) => {
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
                self.plan_condition(cond, scope);
                self.plan_statement(body, scope);
            }
            pt::Statement::Expression(loc, expr) => {
                self.plan_expression_statement(*loc, expr, scope);
            }
            pt::Statement::VariableDefinition(loc, decl, init) => {
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
                if let Some(pt::Expression::ConditionalOperator(_, cond, left, right)) = init {
                    let target = match &decl.name {
                        Some(ident) => TernaryTarget::Declaration(ident),
                        None => TernaryTarget::None,
                    };
                    self.plan_ternary(target, cond, left, right, scope);
                }
            }
            pt::Statement::Return(loc, _)
            | pt::Statement::Emit(loc, _)
            | pt::Statement::Revert(loc, _, _)
            | pt::Statement::RevertNamedArgs(loc, _, _)
            | pt::Statement::Break(loc)
            | pt::Statement::Continue(loc) => {
                self.plan_line(loc.start(), scope);
                self.plan_statement_probe(*loc, scope);
            }
            pt::Statement::Try(loc, _expr, returns, catches) => {
                self.plan_line(loc.start(), scope);
                if let Some((_, ok)) = returns {
                    self.plan_statement(ok, scope);
                }
                for clause in catches {
                    match clause {
                        pt::CatchClause::Simple(_, _, stmt)
                        | pt::CatchClause::Named(_, _, _, stmt) => {
                            self.plan_statement(stmt, scope)
                        }
                    }
                }
            }
            // Explicitly uninstrumented: inline assembly bodies, modifier
            // argument blocks and parser error recovery nodes.
            pt::Statement::Assembly { .. }
            | pt::Statement::Args(..)
            | pt::Statement::Error(_) => {
                trace!("skipping uninstrumented statement kind");
            }
        }
    }

    fn plan_expression_statement(&mut self, loc: pt::Loc, expr: &pt::Expression, scope: usize) {
        self.plan_line(loc.start(), scope);
        self.plan_statement_probe(loc, scope);
        match expr {
            pt::Expression::FunctionCall(_, callee, args) => {
                if let pt::Expression::Variable(name) = &**callee {
                    if matches!(name.name.as_str(), "require" | "assert") {
                        self.plan_require(loc, args, scope);
                    }
                }
            }
            pt::Expression::ConditionalOperator(_, cond, left, right) => {
                self.plan_ternary(TernaryTarget::None, cond, left, right, scope);
            }
            pt::Expression::Assign(_, lhs, rhs) => {
                if let pt::Expression::ConditionalOperator(_, cond, left, right) = &**rhs {
                    match &**lhs {
                        pt::Expression::Variable(ident) => self.plan_ternary(
                            TernaryTarget::Assignment(ident),
                            cond,
                            left,
                            right,
                            scope,
                        ),
                        // Only plain identifier targets admit the tuple
                        // rewrite; anything else is left unobserved.
                        _ => trace!("ternary assigned to a non-identifier target"),
                    }
                }
            }
            _ => {}
        }
    }

    /// `if` branch bookkeeping: one id, two outcome slots. A missing `else`
    /// still gets an observable "not taken" path via a synthesized block.
    fn plan_if_branch(
        &mut self,
        loc: pt::Loc,
        cons: &pt::Statement,
        alt: Option<&pt::Statement>,
        scope: usize,
    ) {
        if !self.config.measure_branch_coverage {
            return;
        }
        debug_assert!(matches!(cons, pt::Statement::Block { .. }), "unnormalized if body");
        let id = self.unit.alloc_branch_id();
        let cons_range = self.range_of(cons.loc());
        let alt_range = alt.map_or_else(|| self.range_of(loc), |alt| self.range_of(alt.loc()));
        let line = self.unit.index.position(loc.start()).line;
        self.unit.branch_map.insert(
            id,
            BranchRecord { line, kind: BranchKind::If, locations: [cons_range, alt_range] },
        );
        self.push(cons.loc().start() + 1, Directive::Branch { id, idx: 0, scope });
        match alt {
            Some(alt) => self.push(alt.loc().start() + 1, Directive::Branch { id, idx: 1, scope }),
            None => self.push(cons.loc().end(), Directive::EmptyBranch { id, idx: 1, scope }),
        }
    }

    /// Assert/require branches cannot be observed as two syntactic paths:
    /// the failing outcome reverts. A pre probe ahead of the call and a post
    /// probe behind it let the reducer derive the split from the gap.
    fn plan_require(&mut self, loc: pt::Loc, args: &[pt::Expression], scope: usize) {
        if let Some(cond) = args.first() {
            self.plan_condition(cond, scope);
        }
        if !self.config.measure_branch_coverage {
            return;
        }
        let id = self.unit.alloc_branch_id();
        let range = self.range_of(loc);
        let line = self.unit.index.position(loc.start()).line;
        self.unit.branch_map.insert(
            id,
            BranchRecord { line, kind: BranchKind::Assert, locations: [range, range] },
        );
        self.push(loc.start(), Directive::RequirePre { id, scope });
        let end = crate::preprocess::end_of_statement(&self.unit.source, loc.end());
        self.push(end, Directive::RequirePost { id, scope });
    }

    /// Ternary arms become `(<probe>, <arm>)` tuples; evaluating an arm then
    /// evaluates its probe first. When the ternary's value is consumed by a
    /// declaration or identifier assignment the target is rewritten into a
    /// tuple assignment so the comma expression stays legal. Ternaries in
    /// return position or nested inside larger expressions admit no such
    /// rewrite and stay unobserved.
    fn plan_ternary(
        &mut self,
        target: TernaryTarget<'_>,
        cond: &pt::Expression,
        left: &pt::Expression,
        right: &pt::Expression,
        scope: usize,
    ) {
        self.plan_condition(cond, scope);
        if !self.config.measure_branch_coverage {
            return;
        }
        let id = self.unit.alloc_branch_id();
        let line = self.unit.index.position(cond.loc().start()).line;
        self.unit.branch_map.insert(
            id,
            BranchRecord {
                line,
                kind: BranchKind::CondExpr,
                locations: [self.range_of(left.loc()), self.range_of(right.loc())],
            },
        );
        self.push(left.loc().start(), Directive::TernaryArm { id, idx: 0, scope });
        self.push(left.loc().end(), Directive::CloseParen);
        self.push(right.loc().start(), Directive::TernaryArm { id, idx: 1, scope });
        self.push(right.loc().end(), Directive::CloseParen);
        match target {
            TernaryTarget::Declaration(ident) => {
                self.push(
                    ident.loc.end(),
                    Directive::Literal { text: format!("; (, {})", ident.name) },
                );
            }
            TernaryTarget::Assignment(ident) => {
                self.push(ident.loc.start(), Directive::Literal { text: "(, ".to_owned() });
                self.push(ident.loc.end(), Directive::CloseParen);
            }
            TernaryTarget::None => {}
        }
    }

    /// Short-circuit operands. Each operand is wrapped so a neutral probe
    /// runs first: `a && b` becomes `(p0 && a) && (p1 && b)` where the probe
    /// helpers return `true` (resp. `false` for `||`), preserving the
    /// operand's value while firing exactly when the operand is evaluated.
    fn plan_condition(&mut self, expr: &pt::Expression, scope: usize) {
        if !self.config.measure_branch_coverage {
            return;
        }
        match expr {
            pt::Expression::And(loc, left, right) => {
                self.plan_short_circuit(*loc, left, right, true, scope);
            }
            pt::Expression::Or(loc, left, right) => {
                self.plan_short_circuit(*loc, left, right, false, scope);
            }
            pt::Expression::Parenthesis(_, inner) | pt::Expression::Not(_, inner) => {
                self.plan_condition(inner, scope);
            }
            _ => {}
        }
    }

    fn plan_short_circuit(
        &mut self,
        loc: pt::Loc,
        left: &pt::Expression,
        right: &pt::Expression,
        is_and: bool,
        scope: usize,
    ) {
        let id = self.unit.alloc_branch_id();
        let line = self.unit.index.position(loc.start()).line;
        self.unit.branch_map.insert(
            id,
            BranchRecord {
                line,
                kind: BranchKind::CondExpr,
                locations: [self.range_of(left.loc()), self.range_of(right.loc())],
            },
        );
        for (idx, operand) in [(0u8, left), (1u8, right)] {
            let directive = if is_and {
                Directive::AndTrue { id, idx, scope }
            } else {
                Directive::OrFalse { id, idx, scope }
            };
            self.push(operand.loc().start(), directive);
            self.push(operand.loc().end(), Directive::CloseParen);
        }
        // Nested `&&`/`||` operands get their own branch ids.
        self.plan_condition(left, scope);
        self.plan_condition(right, scope);
    }

    /// A line probe at the start of a statement's line, provided the line has
    /// not been probed yet and nothing but whitespace precedes the statement
    /// on it (a mid-line statement cannot take a leading probe safely).
    fn plan_line(&mut self, offset: usize, scope: usize) {
        if !self.config.measure_line_coverage {
            return;
        }
        let pos = self.unit.index.position(offset);
        if self.unit.runnable_lines.contains(&pos.line) {
            return;
        }
        let line_start = self.unit.index.line_start(pos.line);
        if !self.unit.source[line_start..offset].trim().is_empty() {
            return;
        }
        self.unit.runnable_lines.insert(pos.line);
        self.push(offset, Directive::Line { line: pos.line, scope });
    }

    fn plan_statement_probe(&mut self, loc: pt::Loc, scope: usize) {
        if !self.config.measure_statement_coverage {
            return;
        }
        let id = self.unit.alloc_statement_id();
        let range = self.range_of(loc);
        self.unit.statement_map.insert(id, range);
        self.push(loc.start(), Directive::Statement { id, scope });
    }

    fn range_of(&self, loc: pt::Loc) -> SourceRange {
        self.unit.index.range(loc.start(), loc.end())
    }

    fn push(&mut self, offset: usize, directive: Directive) {
        self.unit.push_directive(offset, directive);
    }
}

/// Eight hex characters identifying a probe scope, derived from the file path
/// and contract name.
fn scope_suffix(unit: &ContractUnit, name: &str) -> String {
    let digest = keccak256(format!("{}:{}", unit.path.display(), name).as_bytes());
    hex::encode(&digest[..4])
}
