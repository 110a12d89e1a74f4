//! The instrumentation table: probe markers mapped to the coverage entries
//! they feed, with hit counters the runtime collector bumps through a shared
//! reference.

use alloy_primitives::B256;
use std::{
    collections::{hash_map, HashMap},
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

/// What a probe measures, deciding which report bucket its hits land in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    Line,
    Statement,
    Function,
    Branch,
    /// Fires before an assert/require; see [`ProbeKind::RequirePost`].
    RequirePre,
    /// Fires after an assert/require. The pre/post difference is the number
    /// of reverted executions.
    RequirePost,
}

/// One probe's identity and hit counter.
#[derive(Debug)]
pub struct InstrumentationEntry {
    /// Id within the owning map (line number for line probes, otherwise the
    /// planner-assigned statement/function/branch id).
    pub id: u32,
    pub kind: ProbeKind,
    /// Path of the instrumented source file.
    pub contract_path: PathBuf,
    /// Outcome slot for branch probes.
    pub location_idx: Option<u8>,
    hits: AtomicU64,
}

impl InstrumentationEntry {
    pub fn new(id: u32, kind: ProbeKind, contract_path: PathBuf, location_idx: Option<u8>) -> Self {
        Self { id, kind, contract_path, location_idx, hits: AtomicU64::new(0) }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn add_hits(&self, hits: u64) {
        self.hits.fetch_add(hits, Ordering::Relaxed);
    }
}

/// All probes of an instrumented build, keyed by marker.
///
/// Recording is interior-mutable so the table can sit behind an `Arc` shared
/// between the executing VM and the reducer. Counters are relaxed; nothing
/// orders against them.
#[derive(Debug, Default)]
pub struct InstrumentationTable {
    entries: HashMap<B256, InstrumentationEntry>,
}

impl InstrumentationTable {
    pub fn insert(&mut self, marker: B256, entry: InstrumentationEntry) {
        self.entries.insert(marker, entry);
    }

    /// Bumps the counter behind `marker`. Unknown words are ignored, which is
    /// what filters probe markers out of ordinary VM traffic.
    pub fn record(&self, marker: &B256) {
        if let Some(entry) = self.entries.get(marker) {
            entry.add_hits(1);
        }
    }

    pub fn get(&self, marker: &B256) -> Option<&InstrumentationEntry> {
        self.entries.get(marker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&B256, &InstrumentationEntry)> {
        self.entries.iter()
    }

    /// Absorbs another table's probes, as when instrumenting files one by one.
    pub fn extend(&mut self, other: InstrumentationTable) {
        self.entries.extend(other.entries);
    }

    /// Folds another table's hit counts into this one's matching entries.
    /// Used to combine collectors that ran against the same build.
    pub fn merge_hits(&self, other: &InstrumentationTable) {
        for (marker, entry) in &other.entries {
            if let Some(existing) = self.entries.get(marker) {
                existing.add_hits(entry.hits());
            }
        }
    }
}

impl IntoIterator for InstrumentationTable {
    type Item = (B256, InstrumentationEntry);
    type IntoIter = hash_map::IntoIter<B256, InstrumentationEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
