//! Pending transactions awaiting inclusion in the next mined block.

use crate::Transaction;

/// Ordered pool of submitted, not-yet-mined transactions. Insertion order is
/// the order they enter the mined block, and structurally identical
/// transactions are distinct entries.
#[derive(Debug, Default)]
pub struct TransactionPool {
    pending: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction; returns the pending count.
    pub fn add(&mut self, tx: Transaction) -> usize {
        self.pending.push(tx);
        self.pending.len()
    }

    /// Remove and return every pending transaction in insertion order,
    /// leaving the pool empty. Only the mining path calls this, so a bundle
    /// is never split across two blocks.
    pub fn drain_all(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }
}
