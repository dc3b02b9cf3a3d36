//! The ledger state machine: one chain, one pool, append-only growth.

use crate::constants::{
    GENESIS_INDEX, GENESIS_PREVIOUS_HASH, GENESIS_PROOF, REWARD_AMOUNT, REWARD_SENDER,
};
use crate::pool::TransactionPool;
use crate::pow::{self, CancelFlag, PowError};
use crate::{block_hash, unix_timestamp, Block, Transaction};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("chain has no blocks")]
    EmptyChain,

    #[error("candidate chain failed validation")]
    InvalidChain,

    #[error(transparent)]
    SearchCancelled(#[from] PowError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Owns the chain and the transaction pool. All compound read-then-write
/// operations take `&mut self`, so an exclusive lock around the `Ledger` is
/// the entire concurrency discipline: mines serialize with each other, with
/// submissions and with chain replacement.
pub struct Ledger {
    chain: Vec<Block>,
    pool: TransactionPool,
    difficulty: u32,
}

impl Ledger {
    /// A fresh ledger holding only its genesis block.
    pub fn new(difficulty: u32) -> Self {
        let genesis = Block {
            index: GENESIS_INDEX,
            timestamp: unix_timestamp(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH,
        };
        Self {
            chain: vec![genesis],
            pool: TransactionPool::new(),
            difficulty,
        }
    }

    /// The most recently appended block. `EmptyChain` is unreachable after
    /// construction but surfaced rather than panicking.
    pub fn last_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(LedgerError::EmptyChain)
    }

    /// Queue a transaction for the next mined block; returns the index of
    /// the block that will contain it.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<u64> {
        if tx.sender.is_empty() {
            return Err(LedgerError::InvalidTransaction("empty sender".into()));
        }
        if tx.recipient.is_empty() {
            return Err(LedgerError::InvalidTransaction("empty recipient".into()));
        }
        let next_index = self.last_block()?.index + 1;
        let pending = self.pool.add(tx);
        debug!(pending, next_index, "transaction queued");
        Ok(next_index)
    }

    /// Solve the puzzle seeded by the last block's proof, then commit the
    /// pool (plus one reward transaction for `reward_recipient`) into a new
    /// block. Cancellation surfaces as a retryable `SearchCancelled` before
    /// any state is touched.
    pub fn mine(&mut self, reward_recipient: &str, cancel: &CancelFlag) -> Result<Block> {
        let last = self.last_block()?;
        let last_proof = last.proof;
        let next_index = last.index + 1;

        let proof = pow::solve(last_proof, self.difficulty, cancel)?;

        self.pool.add(Transaction {
            sender: REWARD_SENDER.to_string(),
            recipient: reward_recipient.to_string(),
            amount: REWARD_AMOUNT,
        });
        let transactions = self.pool.drain_all();
        let previous_hash = block_hash(self.last_block()?);

        let block = Block {
            index: next_index,
            timestamp: unix_timestamp(),
            transactions,
            proof,
            previous_hash,
        };
        info!(
            index = block.index,
            proof,
            txs = block.transactions.len(),
            "mined block"
        );
        self.chain.push(block.clone());
        Ok(block)
    }

    /// Walk a candidate chain checking genesis shape, hash linkage, index
    /// contiguity and proof validity. Pure and idempotent.
    pub fn is_valid_chain(&self, candidate: &[Block]) -> bool {
        let Some(first) = candidate.first() else {
            return false;
        };
        if first.index != GENESIS_INDEX || first.previous_hash != GENESIS_PREVIOUS_HASH {
            return false;
        }
        for pair in candidate.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.index != prev.index + 1 {
                return false;
            }
            if next.previous_hash != block_hash(prev) {
                return false;
            }
            if !pow::is_valid_proof(prev.proof, next.proof, self.difficulty) {
                return false;
            }
        }
        true
    }

    /// Swap in a validated candidate chain; the local chain is untouched on
    /// failure. The pool is left alone either way.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<()> {
        if !self.is_valid_chain(&candidate) {
            return Err(LedgerError::InvalidChain);
        }
        info!(
            old_len = self.chain.len(),
            new_len = candidate.len(),
            "chain replaced"
        );
        self.chain = candidate;
        Ok(())
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn pending(&self) -> &[Transaction] {
        self.pool.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::is_valid_proof;

    // low difficulty keeps the brute-force search fast in tests
    const TEST_DIFFICULTY: u32 = 1;

    fn tx(sender: &str, recipient: &str, amount: u64) -> Transaction {
        Transaction {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
        }
    }

    #[test]
    fn genesis_shape() {
        let ledger = Ledger::new(TEST_DIFFICULTY);
        let genesis = ledger.last_block().unwrap();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.previous_hash, [0u8; 32]);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert!(genesis.transactions.is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn submit_returns_next_block_index() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        let index = ledger.submit_transaction(tx("alice", "bob", 10)).unwrap();
        assert_eq!(index, 2);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn submit_rejects_empty_identifiers() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        assert!(matches!(
            ledger.submit_transaction(tx("", "bob", 10)),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert!(matches!(
            ledger.submit_transaction(tx("alice", "", 10)),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn zero_amount_is_accepted() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        assert!(ledger.submit_transaction(tx("alice", "bob", 0)).is_ok());
    }

    #[test]
    fn mine_commits_pool_plus_reward() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        ledger.submit_transaction(tx("alice", "bob", 10)).unwrap();
        let genesis_hash = block_hash(ledger.last_block().unwrap());

        let cancel = CancelFlag::new();
        let block = ledger.mine("node-1", &cancel).unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, genesis_hash);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0], tx("alice", "bob", 10));
        assert_eq!(block.transactions[1], tx("0", "node-1", 1));
        assert!(is_valid_proof(GENESIS_PROOF, block.proof, TEST_DIFFICULTY));
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn mine_bundles_all_submissions_into_one_block() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        for i in 0..5 {
            ledger
                .submit_transaction(tx(&format!("sender-{i}"), "bob", i))
                .unwrap();
        }
        let cancel = CancelFlag::new();
        let block = ledger.mine("node-1", &cancel).unwrap();
        assert_eq!(block.transactions.len(), 6); // 5 submitted + 1 reward
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn mined_chains_validate_by_construction() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        let cancel = CancelFlag::new();
        for i in 0..3 {
            ledger.submit_transaction(tx("alice", "bob", i)).unwrap();
            ledger.mine("node-1", &cancel).unwrap();
        }
        let chain = ledger.chain().to_vec();
        assert!(ledger.is_valid_chain(&chain));
        // idempotent
        assert!(ledger.is_valid_chain(&chain));
    }

    #[test]
    fn validation_rejects_tampering() {
        let mut ledger = Ledger::new(TEST_DIFFICULTY);
        let cancel = CancelFlag::new();
        ledger.submit_transaction(tx("alice", "bob", 10)).unwrap();
        ledger.mine("node-1", &cancel).unwrap();
        ledger.mine("node-1", &cancel).unwrap();

        let mut tampered = ledger.chain().to_vec();
        tampered[1].transactions[0].amount = 999;
        assert!(!ledger.is_valid_chain(&tampered));

        let mut gap = ledger.chain().to_vec();
        gap[2].index = 5;
        assert!(!ledger.is_valid_chain(&gap));

        let mut bad_proof = ledger.chain().to_vec();
        bad_proof[1].proof = bad_proof[1].proof.wrapping_add(1);
        assert!(!ledger.is_valid_chain(&bad_proof));
    }

    #[test]
    fn validation_rejects_empty_and_bad_genesis() {
        let ledger = Ledger::new(TEST_DIFFICULTY);
        assert!(!ledger.is_valid_chain(&[]));

        let mut bad_genesis = ledger.chain().to_vec();
        bad_genesis[0].previous_hash = [1u8; 32];
        assert!(!ledger.is_valid_chain(&bad_genesis));

        // a lone well-formed genesis is trivially valid
        assert!(ledger.is_valid_chain(ledger.chain()));
    }

    #[test]
    fn replace_chain_adopts_valid_and_rejects_invalid() {
        let cancel = CancelFlag::new();
        let mut local = Ledger::new(TEST_DIFFICULTY);
        let mut remote = Ledger::new(TEST_DIFFICULTY);
        remote.mine("peer", &cancel).unwrap();
        remote.mine("peer", &cancel).unwrap();

        local.replace_chain(remote.chain().to_vec()).unwrap();
        assert_eq!(local.len(), 3);

        let mut tampered = remote.chain().to_vec();
        tampered[1].proof = 0;
        let before = local.chain().to_vec();
        assert!(matches!(
            local.replace_chain(tampered),
            Err(LedgerError::InvalidChain)
        ));
        assert_eq!(local.chain(), &before[..]);
    }

    #[test]
    fn cancelled_mine_leaves_state_untouched() {
        // difficulty 16 cannot be solved before the first cancel poll
        let mut ledger = Ledger::new(16);
        ledger.submit_transaction(tx("alice", "bob", 10)).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            ledger.mine("node-1", &cancel),
            Err(LedgerError::SearchCancelled(_))
        ));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }
}
