//! Per-file instrumentation state: id counters, static location maps and the
//! pending injection directives.

use crate::ast::LineIndex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

/// A 1-based line paired with a 0-based column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

/// A source range in line/column terms, the way report renderers consume it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: LineColumn,
    pub end: LineColumn,
}

/// An entry in the static function map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub line: u32,
    pub loc: SourceRange,
}

/// The kind tag of a branch record.
///
/// The tag decides how the reducer folds hits for the branch: `if` and
/// `cond-expr` outcomes are observed directly, `assert` pairs are derived
/// from pre/post probe counts because the failing outcome reverts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchKind {
    If,
    CondExpr,
    Assert,
}

/// An entry in the static branch map: two outcome locations, in slot order.
/// Slot 0 is the "taken"/"true" outcome, slot 1 the alternate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: BranchKind,
    pub locations: [SourceRange; 2],
}

/// A probe scope: one per contract, or one per file for free functions.
///
/// The suffix disambiguates the injected helper declarations between scopes
/// so two contracts in one file do not collide.
#[derive(Clone, Debug)]
pub(crate) struct Scope {
    pub(crate) name: String,
    pub(crate) suffix: String,
    pub(crate) file_scoped: bool,
}

/// A single injection directive, keyed by byte offset in the normalized text.
///
/// Directives at the same offset are applied in a fixed priority order (see
/// [`Directive::priority`]); anything else produces text that does not parse.
#[derive(Clone, Debug)]
pub(crate) enum Directive {
    /// A line probe call. `line` doubles as the entry id.
    Line { line: u32, scope: usize },
    /// A statement probe call.
    Statement { id: u32, scope: usize },
    /// A function probe call, placed just inside the body's opening brace.
    Function { id: u32, scope: usize },
    /// A branch outcome probe call, placed just inside an outcome block.
    Branch { id: u32, idx: u8, scope: usize },
    /// A synthesized `else { <probe> }` for an `if` without an alternate.
    EmptyBranch { id: u32, idx: u8, scope: usize },
    /// Probe immediately before an assert/require statement.
    RequirePre { id: u32, scope: usize },
    /// Probe immediately after an assert/require statement.
    RequirePost { id: u32, scope: usize },
    /// Opens a `(<probe>,` tuple around a ternary arm; paired with
    /// [`Directive::CloseParen`] at the arm's end.
    TernaryArm { id: u32, idx: u8, scope: usize },
    /// Opens a `(<probe>() && ` wrap around a short-circuit operand.
    AndTrue { id: u32, idx: u8, scope: usize },
    /// Opens a `(<probe>() || ` wrap around a short-circuit operand.
    OrFalse { id: u32, idx: u8, scope: usize },
    OpenParen,
    CloseParen,
    /// Verbatim text, used for the tuple-assignment ternary rewrite.
    Literal { text: String },
    /// The per-scope pure helper declarations that probe calls target.
    HashMethods { scope: usize },
}

impl Directive {
    /// Within-offset application priority; lower values end up earlier in the
    /// final text. Paren-closing comes first, expression wraps hug the
    /// expression they decorate, and plain probe statements sit in between.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Self::CloseParen => 0,
            Self::HashMethods { .. } => 1,
            Self::RequirePre { .. } => 2,
            Self::Function { .. } => 3,
            Self::Branch { .. } => 4,
            Self::EmptyBranch { .. } => 5,
            Self::Statement { .. } => 6,
            Self::RequirePost { .. } => 7,
            Self::Line { .. } => 8,
            Self::Literal { .. } => 9,
            Self::TernaryArm { .. } => 10,
            Self::AndTrue { .. } => 11,
            Self::OrFalse { .. } => 12,
            Self::OpenParen => 13,
        }
    }
}

/// Everything the engine knows about one source file under instrumentation.
///
/// Owned exclusively by the engine for the duration of one `instrument()`
/// call and treated as immutable once returned as part of the output.
#[derive(Debug)]
pub struct ContractUnit {
    /// Canonical path of the source file.
    pub path: PathBuf,
    /// The normalized (preprocessed) source text the maps refer to.
    pub source: String,
    pub(crate) index: LineIndex,

    next_function_id: u32,
    next_statement_id: u32,
    next_branch_id: u32,

    /// Lines that carry a line probe.
    pub runnable_lines: BTreeSet<u32>,
    pub statement_map: BTreeMap<u32, SourceRange>,
    pub function_map: BTreeMap<u32, FunctionRecord>,
    pub branch_map: BTreeMap<u32, BranchRecord>,

    pub(crate) scopes: Vec<Scope>,
    pub(crate) injections: BTreeMap<usize, Vec<Directive>>,
}

impl ContractUnit {
    pub(crate) fn new(path: PathBuf, source: String) -> Self {
        let index = LineIndex::new(&source);
        Self {
            path,
            source,
            index,
            next_function_id: 1,
            next_statement_id: 1,
            next_branch_id: 1,
            runnable_lines: BTreeSet::new(),
            statement_map: BTreeMap::new(),
            function_map: BTreeMap::new(),
            branch_map: BTreeMap::new(),
            scopes: Vec::new(),
            injections: BTreeMap::new(),
        }
    }

    pub(crate) fn alloc_function_id(&mut self) -> u32 {
        let id = self.next_function_id;
        self.next_function_id += 1;
        id
    }

    pub(crate) fn alloc_statement_id(&mut self) -> u32 {
        let id = self.next_statement_id;
        self.next_statement_id += 1;
        id
    }

    pub(crate) fn alloc_branch_id(&mut self) -> u32 {
        let id = self.next_branch_id;
        self.next_branch_id += 1;
        id
    }

    pub(crate) fn push_directive(&mut self, offset: usize, directive: Directive) {
        self.injections.entry(offset).or_default().push(directive);
    }

    pub(crate) fn push_scope(&mut self, scope: Scope) -> usize {
        self.scopes.push(scope);
        self.scopes.len() - 1
    }
}
