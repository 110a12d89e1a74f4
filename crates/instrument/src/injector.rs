//! The injector.
//!
//! Consumes a planned [`ContractUnit`] and splices probe text into its source.
//! Offsets are applied in descending order so earlier injections never shift
//! the offsets of later ones; directives sharing an offset are ordered by
//! [`Directive::priority`] and applied in reverse, leaving them in priority
//! order in the final text. Probe markers are assigned from a per-file
//! sequence as the probes are rendered.

use crate::{
    table::{InstrumentationEntry, InstrumentationTable, ProbeKind},
    unit::{ContractUnit, Directive, Scope},
    InstrumentError, Result,
};
use alloy_primitives::{keccak256, B256};
use itertools::Itertools;
use std::mem;

pub(crate) fn apply(unit: &mut ContractUnit) -> Result<(String, InstrumentationTable)> {
    let mut injector = Injector { unit, table: InstrumentationTable::default(), next_seq: 0 };
    let source = injector.splice()?;
    Ok((source, injector.table))
}

struct Injector<'a> {
    unit: &'a mut ContractUnit,
    table: InstrumentationTable,
    next_seq: u32,
}

impl Injector<'_> {
    fn splice(&mut self) -> Result<String> {
        let mut source = self.unit.source.clone();
        let injections = mem::take(&mut self.unit.injections);
        for (&offset, directives) in injections.iter().rev() {
            if !source.is_char_boundary(offset) {
                return Err(InstrumentError::Injection {
                    path: self.unit.path.clone(),
                    offset,
                    len: source.len(),
                });
            }
            let ordered = directives.iter().sorted_by_key(|d| d.priority()).collect::<Vec<_>>();
            for directive in ordered.into_iter().rev() {
                let text = self.render(directive);
                source.insert_str(offset, &text);
            }
        }
        Ok(source)
    }

    fn render(&mut self, directive: &Directive) -> String {
        match directive {
            Directive::Line { line, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *line, ProbeKind::Line, None);
                format!("{call};")
            }
            Directive::Statement { id, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::Statement, None);
                format!("{call};")
            }
            Directive::Function { id, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::Function, None);
                format!("{call};")
            }
            Directive::Branch { id, idx, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::Branch, Some(*idx));
                format!("{call};")
            }
            Directive::EmptyBranch { id, idx, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::Branch, Some(*idx));
                format!("else {{ {call}; }}")
            }
            Directive::RequirePre { id, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::RequirePre, None);
                format!("{call};")
            }
            Directive::RequirePost { id, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::RequirePost, None);
                format!("{call};")
            }
            Directive::TernaryArm { id, idx, scope } => {
                let (call, marker) = self.probe(*scope);
                self.insert(marker, *id, ProbeKind::Branch, Some(*idx));
                format!("({call},")
            }
            Directive::AndTrue { id, idx, scope } => {
                let marker = self.next_marker(*scope);
                self.insert(marker, *id, ProbeKind::Branch, Some(*idx));
                let suffix = &self.unit.scopes[*scope].suffix;
                format!("(c_true{suffix}(0x{marker:x}) && ")
            }
            Directive::OrFalse { id, idx, scope } => {
                let marker = self.next_marker(*scope);
                self.insert(marker, *id, ProbeKind::Branch, Some(*idx));
                let suffix = &self.unit.scopes[*scope].suffix;
                format!("(c_false{suffix}(0x{marker:x}) || ")
            }
            Directive::OpenParen => "(".to_owned(),
            Directive::CloseParen => ")".to_owned(),
            Directive::Literal { text } => text.clone(),
            Directive::HashMethods { scope } => hash_methods(&self.unit.scopes[*scope]),
        }
    }

    /// Renders a plain probe call and registers its marker.
    fn probe(&mut self, scope: usize) -> (String, B256) {
        let marker = self.next_marker(scope);
        let suffix = &self.unit.scopes[scope].suffix;
        (format!("c_{suffix}(0x{marker:x})"), marker)
    }

    /// The next probe marker for `scope`. Markers are full keccak digests of
    /// `path:contract:seq`; 256 bits make cross-file collisions a non-issue.
    fn next_marker(&mut self, scope: usize) -> B256 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let scope = &self.unit.scopes[scope];
        keccak256(format!("{}:{}:{seq}", self.unit.path.display(), scope.name).as_bytes())
    }

    fn insert(&mut self, marker: B256, id: u32, kind: ProbeKind, location_idx: Option<u8>) {
        self.table.insert(
            marker,
            InstrumentationEntry::new(id, kind, self.unit.path.clone(), location_idx),
        );
    }
}

/// The helper declarations probe calls resolve to. Rendered without newlines
/// so injection never changes line numbering. The helpers take the marker as
/// an argument so it survives into bytecode as a PUSH32 immediate; the bodies
/// are empty and the optimizer is expected to be off during coverage runs.
fn hash_methods(scope: &Scope) -> String {
    let s = &scope.suffix;
    // Free functions cannot carry visibility.
    let vis = if scope.file_scoped { "" } else { " internal" };
    format!(
        "function c_{s}(bytes32 c__{s}){vis} pure {{}}\
         function c_true{s}(bytes32 c__{s}){vis} pure returns (bool) {{ return true; }}\
         function c_false{s}(bytes32 c__{s}){vis} pure returns (bool) {{ return false; }}"
    )
}
