//! Longest-valid-chain fork resolution.
//!
//! Among the local chain and every candidate that passes validation, the
//! strictly longest wins; ties keep the local chain. Length is block count —
//! there is no cumulative-difficulty weighting, a known simplification that
//! offers no protection against adversarial forks.

use crate::ledger::Ledger;
use crate::Block;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("malformed peer response: {0}")]
    Malformed(String),
}

/// Injected peer capability: who the peers are and how to read their chains.
/// Keeps resolution testable without network I/O.
pub trait PeerChainSource {
    fn peer_addresses(&self) -> Vec<String>;
    fn fetch_chain(&self, address: &str) -> Result<Vec<Block>, FetchError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub replaced: bool,
    /// Local chain length after resolution, replaced or not.
    pub length: usize,
}

/// Apply the longest-valid-chain rule to pre-fetched candidates.
pub fn resolve(ledger: &mut Ledger, candidates: Vec<Vec<Block>>) -> ResolveOutcome {
    let mut best: Option<Vec<Block>> = None;
    let mut best_len = ledger.len();

    for candidate in candidates {
        if candidate.len() <= best_len {
            continue;
        }
        if !ledger.is_valid_chain(&candidate) {
            debug!(length = candidate.len(), "discarding invalid peer chain");
            continue;
        }
        best_len = candidate.len();
        best = Some(candidate);
    }

    match best {
        Some(chain) => {
            // already validated; replace_chain re-checks before swapping
            let replaced = ledger.replace_chain(chain).is_ok();
            if replaced {
                info!(length = ledger.len(), "adopted longer peer chain");
            }
            ResolveOutcome {
                replaced,
                length: ledger.len(),
            }
        }
        None => ResolveOutcome {
            replaced: false,
            length: ledger.len(),
        },
    }
}

/// Gather candidate chains from a peer source and resolve. A peer that fails
/// to respond or responds malformed contributes nothing and never aborts
/// resolution of the rest.
pub fn resolve_from_source<S: PeerChainSource>(ledger: &mut Ledger, source: &S) -> ResolveOutcome {
    let mut candidates = Vec::new();
    for address in source.peer_addresses() {
        match source.fetch_chain(&address) {
            Ok(chain) => candidates.push(chain),
            Err(err) => warn!(%address, %err, "skipping peer during resolution"),
        }
    }
    resolve(ledger, candidates)
}
