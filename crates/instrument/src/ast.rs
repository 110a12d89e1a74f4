//! Thin adapter over the external Solidity parser.
//!
//! The parser is a black box as far as the engine is concerned: it produces a
//! parse tree whose nodes carry byte-offset locations, and everything else in
//! this crate works in terms of those offsets.

use crate::{
    unit::{LineColumn, SourceRange},
    InstrumentError, Result,
};
use solang_parser::{diagnostics::Diagnostic, pt};
use std::path::Path;

/// Parses `text`, attaching `path` to any parse failure.
pub(crate) fn parse_source(path: &Path, text: &str) -> Result<pt::SourceUnit> {
    match solang_parser::parse(text, 0) {
        Ok((unit, _comments)) => Ok(unit),
        Err(diagnostics) => Err(parse_error(path, &diagnostics)),
    }
}

fn parse_error(path: &Path, diagnostics: &[Diagnostic]) -> InstrumentError {
    let message = diagnostics
        .first()
        .map(|d| d.message.clone())
        .unwrap_or_else(|| "unknown parse error".to_owned());
    InstrumentError::Parse { path: path.to_path_buf(), message }
}

/// Byte-offset to line/column translation for one revision of a source text.
#[derive(Clone, Debug)]
pub(crate) struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Returns the 1-based line and 0-based column of `offset`.
    pub(crate) fn position(&self, offset: usize) -> LineColumn {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        LineColumn { line: line as u32, column: (offset - self.line_starts[line - 1]) as u32 }
    }

    /// Byte offset at which `line` (1-based) starts.
    pub(crate) fn line_start(&self, line: u32) -> usize {
        self.line_starts[(line - 1) as usize]
    }

    pub(crate) fn range(&self, start: usize, end: usize) -> SourceRange {
        SourceRange { start: self.position(start), end: self.position(end) }
    }
}
