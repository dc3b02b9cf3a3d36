//! Conventions every cooperating node must agree on out-of-band.

/// Chains are 1-indexed; the genesis block sits at index 1.
pub const GENESIS_INDEX: u64 = 1;
/// Previous-proof seed used when mining the first real block.
pub const GENESIS_PROOF: u64 = 100;
/// Predecessor sentinel carried by every genesis block.
pub const GENESIS_PREVIOUS_HASH: [u8; 32] = [0u8; 32];

/// Sender identifier marking a system-minted reward transaction.
pub const REWARD_SENDER: &str = "0";
pub const REWARD_AMOUNT: u64 = 1;

/// Leading zero hex digits a valid proof digest must carry.
pub const DEFAULT_DIFFICULTY: u32 = 4;
/// A 256-bit digest has 64 hex digits; difficulty cannot exceed it.
pub const MAX_DIFFICULTY: u32 = 64;

/// The proof search polls its cancel flag every this many candidates.
pub const CANCEL_CHECK_INTERVAL: u64 = 4096;
