//! Source-level coverage instrumentation for Solidity.
//!
//! The engine rewrites Solidity source so that executing it leaves a trace of
//! which lines, statements, functions and branch outcomes ran. It works in
//! three stages over each file:
//!
//! 1. [preprocessing](preprocess): normalize the text to a fixed point where
//!    every conditional and loop body is a braced block and purity modifiers
//!    that would reject probe calls are blanked out;
//! 2. planning ([`planner`]): walk the parse tree, assign ids, record the
//!    static maps and schedule injection directives by byte offset;
//! 3. injection ([`injector`]): splice probe calls and helper declarations
//!    into the text, derive a unique marker per probe and collect the
//!    marker table.
//!
//! The instrumented source compiles like the original. At runtime each probe
//! call pushes its 32-byte marker onto the VM stack; a step listener (see the
//! companion coverage crate) looks markers up in the [`InstrumentationTable`]
//! and bumps the matching hit counters.

#![warn(unreachable_pub, rust_2018_idioms)]

#[macro_use]
extern crate tracing;

use rayon::prelude::*;
use std::path::{Path, PathBuf};

mod ast;
mod injector;
mod planner;
pub mod preprocess;
mod table;
mod unit;

pub use table::{InstrumentationEntry, InstrumentationTable, ProbeKind};
pub use unit::{
    BranchKind, BranchRecord, ContractUnit, FunctionRecord, LineColumn, SourceRange,
};

/// Errors produced while instrumenting a source file.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{path}: normalization did not converge after {passes} passes")]
    FixedPoint { path: PathBuf, passes: usize },
    #[error("{path}: injection offset {offset} is not a char boundary (source len {len})")]
    Injection { path: PathBuf, offset: usize, len: usize },
}

pub type Result<T, E = InstrumentError> = std::result::Result<T, E>;

/// What to measure and which files to leave alone.
#[derive(Clone, Debug)]
pub struct InstrumentConfig {
    /// Paths excluded from instrumentation, matched by suffix so both
    /// absolute and project-relative paths work.
    pub exclude: Vec<PathBuf>,
    pub measure_line_coverage: bool,
    pub measure_statement_coverage: bool,
    pub measure_function_coverage: bool,
    pub measure_branch_coverage: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            measure_line_coverage: true,
            measure_statement_coverage: true,
            measure_function_coverage: true,
            measure_branch_coverage: true,
        }
    }
}

impl InstrumentConfig {
    fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|excluded| path.ends_with(excluded))
    }
}

/// The result of instrumenting one file.
#[derive(Debug)]
pub struct InstrumentOutput {
    /// Static maps and metadata for the file.
    pub unit: ContractUnit,
    /// The instrumented source text, ready to compile.
    pub source: String,
    /// Marker table for the file's probes.
    pub table: InstrumentationTable,
}

/// The instrumentation engine.
#[derive(Clone, Debug, Default)]
pub struct Instrumenter {
    config: InstrumentConfig,
}

impl Instrumenter {
    pub fn new(config: InstrumentConfig) -> Self {
        Self { config }
    }

    /// Instruments a single source file.
    #[instrument(name = "instrument", skip_all, fields(path = %path.display()))]
    pub fn instrument(&self, path: &Path, source: &str) -> Result<InstrumentOutput> {
        let normalized = preprocess::normalize(path, source)?;
        let ast = ast::parse_source(path, &normalized)?;
        let mut unit = ContractUnit::new(path.to_path_buf(), normalized);
        planner::plan(&ast, &mut unit, &self.config);
        let (source, table) = injector::apply(&mut unit)?;
        debug!(probes = table.len(), "instrumented");
        Ok(InstrumentOutput { unit, source, table })
    }

    /// Instruments a batch of files in parallel, skipping excluded paths.
    /// Excluded files are absent from the output rather than passed through.
    ///
    /// Results are per file: a file that fails to parse halts only its own
    /// instrumentation, and the caller decides whether to abort the build or
    /// carry on without that file.
    pub fn instrument_all<'a>(
        &self,
        sources: impl IntoParallelIterator<Item = (&'a Path, &'a str)>,
    ) -> Vec<(PathBuf, Result<InstrumentOutput>)> {
        sources
            .into_par_iter()
            .filter(|(path, _)| !self.config.is_excluded(path))
            .map(|(path, source)| (path.to_path_buf(), self.instrument(path, source)))
            .collect()
    }
}
