//! VM step listener that turns probe marker pushes into hit counts.
//!
//! Instrumented probe calls pass their marker as a `bytes32` argument, so
//! the marker appears on the stack as a `PUSH32` immediate the moment the
//! call is evaluated. The collector watches every push, normalizes the
//! pushed word to 32 bytes and asks the instrumentation table whether it is
//! a known marker; ordinary pushed values miss the table and cost one map
//! lookup.

use alloy_primitives::{B256, U256};
use revm::{
    interpreter::{opcode, Interpreter},
    Database, EvmContext, Inspector,
};
use solcov_instrument::InstrumentationTable;
use std::{mem, sync::Arc};

/// Collects probe hits during EVM execution.
///
/// Clones share the same table, so one collector per transaction against a
/// shared build works out of the box.
#[derive(Clone, Debug)]
pub struct CoverageCollector {
    table: Arc<InstrumentationTable>,
    /// Set when the current step is a push; the pushed word is only on the
    /// stack once the step has completed.
    pending_push: bool,
}

impl CoverageCollector {
    pub fn new(table: Arc<InstrumentationTable>) -> Self {
        Self { table, pending_push: false }
    }

    pub fn table(&self) -> &Arc<InstrumentationTable> {
        &self.table
    }

    /// Records `word` if it is a known probe marker. Values narrower than 32
    /// bytes are left-padded first, so markers survive any push width the
    /// compiler chooses.
    pub fn observe_word(&self, word: U256) {
        let marker = B256::from(word);
        self.table.record(&marker);
    }
}

impl<DB: Database> Inspector<DB> for CoverageCollector {
    fn step(&mut self, interp: &mut Interpreter, _context: &mut EvmContext<DB>) {
        let op = interp.current_opcode();
        self.pending_push = (opcode::PUSH1..=opcode::PUSH32).contains(&op);
    }

    fn step_end(&mut self, interp: &mut Interpreter, _context: &mut EvmContext<DB>) {
        if mem::take(&mut self.pending_push) {
            if let Ok(word) = interp.stack.peek(0) {
                self.observe_word(word);
            }
        }
    }
}
