//! Runtime coverage collection and reporting for instrumented Solidity.
//!
//! The companion instrumentation crate rewrites sources so every probe call
//! pushes a unique 32-byte marker onto the VM stack. This crate closes the
//! loop: [`CoverageCollector`] listens to VM steps and counts marker hits in
//! the shared [`InstrumentationTable`](solcov_instrument::InstrumentationTable),
//! and [`CoverageReducer`] folds those counts into a [`CoverageReport`] ready
//! to serialize for report renderers.

#![warn(unreachable_pub, rust_2018_idioms)]

#[macro_use]
extern crate tracing;

mod collector;
mod reducer;
mod report;

pub use collector::CoverageCollector;
pub use reducer::CoverageReducer;
pub use report::{CoverageRecord, CoverageReport, CoverageSummary};
