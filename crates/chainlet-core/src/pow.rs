//! Proof-of-work puzzle: find the smallest candidate that, hashed together
//! with the previous block's proof, yields a digest starting with a run of
//! zero hex digits.
//!
//! The hash input is always `previous.to_le_bytes() ‖ candidate.to_le_bytes()`
//! — both proofs enter the digest, which is what ties each solution to its
//! predecessor. The search is a linear scan from 0, so it returns the
//! smallest solution; its worst-case cost is unbounded (a liveness risk, not
//! a correctness one), which is why callers hand it a cancel flag.

use crate::constants::CANCEL_CHECK_INTERVAL;
use crate::Hash;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("proof search cancelled")]
    Cancelled,
}

/// Cloneable cancellation handle for an in-flight proof search.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Digest of a (previous, candidate) proof pair.
pub fn proof_digest(previous: u64, candidate: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(previous.to_le_bytes());
    hasher.update(candidate.to_le_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Count of leading zero hex digits in a digest.
pub fn leading_zero_digits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if *b >> 4 == 0 {
                total += 1;
            }
            break;
        }
    }
    total
}

pub fn is_valid_proof(previous: u64, candidate: u64, difficulty: u32) -> bool {
    leading_zero_digits(&proof_digest(previous, candidate)) >= difficulty
}

/// Search upward from 0 for the smallest proof valid against `previous`.
/// Polls `cancel` every `CANCEL_CHECK_INTERVAL` candidates.
pub fn solve(previous: u64, difficulty: u32, cancel: &CancelFlag) -> Result<u64, PowError> {
    let mut candidate = 0u64;
    loop {
        if candidate % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(PowError::Cancelled);
        }
        if is_valid_proof(previous, candidate, difficulty) {
            return Ok(candidate);
        }
        candidate = candidate.wrapping_add(1);
    }
}
