//! The coverage report object and its JSON shape.
//!
//! The serialized layout follows the de facto istanbul-style schema report
//! renderers consume: per-file records keyed by path, with `l`/`s`/`f`/`b`
//! hit objects next to the static `fnMap`/`statementMap`/`branchMap`.

use eyre::{Result, WrapErr};
use serde::Serialize;
use solcov_instrument::{BranchRecord, FunctionRecord, SourceRange};
use std::{collections::BTreeMap, fs, ops::AddAssign, path::Path};

/// A full coverage report: one record per instrumented file.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct CoverageReport {
    pub records: BTreeMap<String, CoverageRecord>,
}

impl CoverageReport {
    /// Writes the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .wrap_err_with(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).wrap_err("failed to serialize report")?;
        Ok(())
    }

    /// Aggregate totals across all records.
    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for record in self.records.values() {
            summary += &record.summary();
        }
        summary
    }
}

/// Coverage data for one source file.
#[derive(Clone, Debug, Serialize)]
pub struct CoverageRecord {
    pub path: String,
    /// Hits per runnable line, keyed by 1-based line number.
    #[serde(rename = "l")]
    pub line_hits: BTreeMap<u32, u64>,
    #[serde(rename = "s")]
    pub statement_hits: BTreeMap<u32, u64>,
    #[serde(rename = "f")]
    pub function_hits: BTreeMap<u32, u64>,
    /// Hits per branch outcome slot, keyed by branch id.
    #[serde(rename = "b")]
    pub branch_hits: BTreeMap<u32, [u64; 2]>,
    #[serde(rename = "fnMap")]
    pub function_map: BTreeMap<u32, FunctionRecord>,
    #[serde(rename = "statementMap")]
    pub statement_map: BTreeMap<u32, SourceRange>,
    #[serde(rename = "branchMap")]
    pub branch_map: BTreeMap<u32, BranchRecord>,
    /// Pre/post counters for assert-style branches, folded into `b` when the
    /// report is generated.
    #[serde(skip)]
    pub(crate) assert_states: BTreeMap<u32, AssertState>,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct AssertState {
    pub(crate) pre: u64,
    pub(crate) post: u64,
}

impl CoverageRecord {
    pub fn summary(&self) -> CoverageSummary {
        CoverageSummary {
            line_hits: self.line_hits.values().filter(|&&h| h > 0).count(),
            line_total: self.line_hits.len(),
            statement_hits: self.statement_hits.values().filter(|&&h| h > 0).count(),
            statement_total: self.statement_hits.len(),
            function_hits: self.function_hits.values().filter(|&&h| h > 0).count(),
            function_total: self.function_hits.len(),
            branch_hits: self
                .branch_hits
                .values()
                .flatten()
                .filter(|&&h| h > 0)
                .count(),
            branch_total: self.branch_hits.len() * 2,
        }
    }
}

/// Covered/total counts per measurement, where each branch contributes two
/// outcome slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoverageSummary {
    pub line_hits: usize,
    pub line_total: usize,
    pub statement_hits: usize,
    pub statement_total: usize,
    pub function_hits: usize,
    pub function_total: usize,
    pub branch_hits: usize,
    pub branch_total: usize,
}

impl AddAssign<&Self> for CoverageSummary {
    fn add_assign(&mut self, other: &Self) {
        self.line_hits += other.line_hits;
        self.line_total += other.line_total;
        self.statement_hits += other.statement_hits;
        self.statement_total += other.statement_total;
        self.function_hits += other.function_hits;
        self.function_total += other.function_total;
        self.branch_hits += other.branch_hits;
        self.branch_total += other.branch_total;
    }
}
