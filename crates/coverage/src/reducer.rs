//! The reducer: folds raw probe hits into the report object.
//!
//! Registration happens at instrumentation time and seeds a zeroed skeleton
//! per file, so unexecuted code shows up as zero entries rather than being
//! absent. Generation walks the instrumentation table once, routes each
//! entry's hits into the matching bucket and finally derives assert-style
//! branch pairs from their pre/post counters.

use crate::report::{AssertState, CoverageRecord, CoverageReport};
use solcov_instrument::{ContractUnit, InstrumentationTable, ProbeKind};
use std::{collections::BTreeMap, mem};

/// Builds one [`CoverageReport`] out of registered units and collected hits.
#[derive(Debug, Default)]
pub struct CoverageReducer {
    records: BTreeMap<String, CoverageRecord>,
}

impl CoverageReducer {
    /// Seeds a zeroed record for `unit`. Re-registering a path replaces its
    /// record, as when a file is re-instrumented.
    pub fn register(&mut self, unit: &ContractUnit) {
        let path = unit.path.display().to_string();
        let record = CoverageRecord {
            path: path.clone(),
            line_hits: unit.runnable_lines.iter().map(|&line| (line, 0)).collect(),
            statement_hits: unit.statement_map.keys().map(|&id| (id, 0)).collect(),
            function_hits: unit.function_map.keys().map(|&id| (id, 0)).collect(),
            branch_hits: unit.branch_map.keys().map(|&id| (id, [0, 0])).collect(),
            function_map: unit.function_map.clone(),
            statement_map: unit.statement_map.clone(),
            branch_map: unit.branch_map.clone(),
            // One state per branch id; only assert pre/post probes ever
            // target them.
            assert_states: unit
                .branch_map
                .keys()
                .map(|&id| (id, AssertState::default()))
                .collect(),
        };
        self.records.insert(path, record);
    }

    /// Consumes the accumulated state and produces the report.
    pub fn generate(&mut self, table: &InstrumentationTable) -> CoverageReport {
        for (_, entry) in table.iter() {
            let hits = entry.hits();
            if hits == 0 {
                continue;
            }
            let path = entry.contract_path.display().to_string();
            let Some(record) = self.records.get_mut(&path) else {
                debug!(%path, "hits for an unregistered file");
                continue;
            };
            match entry.kind {
                ProbeKind::Line => {
                    if let Some(count) = record.line_hits.get_mut(&entry.id) {
                        *count += hits;
                    }
                }
                ProbeKind::Statement => {
                    if let Some(count) = record.statement_hits.get_mut(&entry.id) {
                        *count += hits;
                    }
                }
                ProbeKind::Function => {
                    if let Some(count) = record.function_hits.get_mut(&entry.id) {
                        *count += hits;
                    }
                }
                ProbeKind::Branch => {
                    let idx = entry.location_idx.unwrap_or_default() as usize;
                    if let Some(pair) = record.branch_hits.get_mut(&entry.id) {
                        pair[idx.min(1)] += hits;
                    }
                }
                ProbeKind::RequirePre => {
                    if let Some(state) = record.assert_states.get_mut(&entry.id) {
                        state.pre += hits;
                    }
                }
                ProbeKind::RequirePost => {
                    if let Some(state) = record.assert_states.get_mut(&entry.id) {
                        state.post += hits;
                    }
                }
            }
        }

        let mut records = mem::take(&mut self.records);
        for record in records.values_mut() {
            // Slot 0 holds the passing outcome, slot 1 the reverted one. A
            // revert unwinds the post probe, so the gap is the failure count.
            for (&id, state) in &record.assert_states {
                if state.pre > 0 {
                    if let Some(pair) = record.branch_hits.get_mut(&id) {
                        *pair = [state.post, state.pre.saturating_sub(state.post)];
                    }
                }
            }
        }
        CoverageReport { records }
    }
}
