//! Source normalization.
//!
//! The planner assumes every conditional and loop body is a braced block and
//! that no purity modifier will reject the injected probe calls. This pass
//! repeatedly parses the text, performs exactly one mutation (wrap a
//! single-statement body in braces, or blank out a `pure`/`view`/`constant`
//! attribute) and re-parses, until a full scan finds nothing left to change.
//! Re-parsing after every mutation keeps all offsets honest.

use crate::{ast, InstrumentError, Result};
use solang_parser::pt::{self, CodeLocation};
use std::path::Path;

/// Upper bound on normalization passes. Every pass removes one normalization
/// candidate and introduces none, so well-formed input terminates far below
/// this; the bound turns a planner bug into a loud error instead of a hang.
const MAX_PASSES: usize = 4096;

enum Mutation {
    /// Wrap `start..end` in braces.
    Wrap { start: usize, end: usize },
    /// Replace `start..end` with spaces of the same length.
    Blank { start: usize, end: usize },
}

/// Normalizes `text` to its fixed point.
pub fn normalize(path: &Path, text: &str) -> Result<String> {
    let mut text = text.to_owned();
    for pass in 0..MAX_PASSES {
        let ast = ast::parse_source(path, &text)?;
        match find_mutation(&ast) {
            Some(Mutation::Wrap { start, end }) => {
                let end = end_of_statement(&text, end);
                text.insert(end, '}');
                text.insert(start, '{');
            }
            Some(Mutation::Blank { start, end }) => {
                text.replace_range(start..end, &" ".repeat(end - start));
            }
            None => {
                trace!(path = %path.display(), passes = pass, "normalization fixed point");
                return Ok(text);
            }
        }
    }
    Err(InstrumentError::FixedPoint { path: path.to_path_buf(), passes: MAX_PASSES })
}

/// Extends a statement's end offset through its terminating semicolon, in
/// case the parser's span stops short of it.
pub(crate) fn end_of_statement(text: &str, end: usize) -> usize {
    let bytes = text.as_bytes();
    if end > 0 && matches!(bytes[end - 1], b';' | b'}') {
        return end;
    }
    let mut i = end;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b';' {
        i + 1
    } else {
        end
    }
}

fn find_mutation(unit: &pt::SourceUnit) -> Option<Mutation> {
    unit.0.iter().find_map(|part| match part {
        pt::SourceUnitPart::ContractDefinition(def) => {
            def.parts.iter().find_map(|part| match part {
                pt::ContractPart::FunctionDefinition(func) => check_function(func),
                _ => None,
            })
        }
        pt::SourceUnitPart::FunctionDefinition(func) => check_function(func),
        _ => None,
    })
}

fn check_function(func: &pt::FunctionDefinition) -> Option<Mutation> {
    // Purity attributes go first: interface and abstract signatures must be
    // stripped as well, or overriding them with instrumented bodies fails.
    for attr in &func.attributes {
        if let pt::FunctionAttribute::Mutability(mutability) = attr {
            match mutability {
                pt::Mutability::Pure(loc)
                | pt::Mutability::View(loc)
                | pt::Mutability::Constant(loc) => {
                    return Some(Mutation::Blank { start: loc.start(), end: loc.end() })
                }
                pt::Mutability::Payable(_) => {}
            }
        }
    }
    func.body.as_ref().and_then(find_unbraced_body)
}

fn find_unbraced_body(stmt: &pt::Statement) -> Option<Mutation> {
    match stmt {
        pt::Statement::Block { statements, .. } => statements.iter().find_map(find_unbraced_body),
        pt::Statement::If(_, _, cons, alt) => wrap_candidate(cons)
            .or_else(|| find_unbraced_body(cons))
            .or_else(|| alt.as_deref().and_then(wrap_candidate))
            .or_else(|| alt.as_deref().and_then(find_unbraced_body)),
        pt::Statement::While(_, _, body) | pt::Statement::DoWhile(_, body, _) => {
            wrap_candidate(body).or_else(|| find_unbraced_body(body))
        }
        pt::Statement::For(_, _, _, _, body) => body
            .as_deref()
            .and_then(wrap_candidate)
            .or_else(|| body.as_deref().and_then(find_unbraced_body)),
        pt::Statement::Try(_, _, returns, catches) => returns
            .as_ref()
            .and_then(|(_, ok)| find_unbraced_body(ok))
            .or_else(|| {
                catches.iter().find_map(|clause| match clause {
                    pt::CatchClause::Simple(_, _, stmt)
                    | pt::CatchClause::Named(_, _, _, stmt) => find_unbraced_body(stmt),
                })
            }),
        _ => None,
    }
}

/// A control-flow body that is a single statement rather than a block. An
/// `else if` chain lands here too: wrapping it makes chained branches nest,
/// so each `if` carries its own branch id without double counting.
fn wrap_candidate(stmt: &pt::Statement) -> Option<Mutation> {
    if matches!(stmt, pt::Statement::Block { .. }) {
        None
    } else {
        let loc = stmt.loc();
        Some(Mutation::Wrap { start: loc.start(), end: loc.end() })
    }
}
