use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod consensus;
pub mod constants;
pub mod ledger;
pub mod pool;
pub mod pow;

pub use consensus::{resolve, resolve_from_source, FetchError, PeerChainSource, ResolveOutcome};
pub use ledger::{Ledger, LedgerError};
pub use pool::TransactionPool;
pub use pow::{CancelFlag, PowError};

pub type Hash = [u8; 32];

/// A value transfer awaiting inclusion in a block. `sender == "0"` marks a
/// system-minted mining reward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

/// One link of the chain. Immutable once appended; `previous_hash` is the
/// digest of the preceding block (all zeroes for genesis).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    #[serde(with = "hex_hash")]
    pub previous_hash: Hash,
}

impl Block {
    /// Stable byte encoding fed to the block digest: index, timestamp and
    /// proof as little-endian u64, the previous hash, then the digest of
    /// each transaction in bundle order. Every node must frame blocks this
    /// way for chains to link across the network.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 8 + 8 + 32 + 32 * self.transactions.len());
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.proof.to_le_bytes());
        bytes.extend_from_slice(&self.previous_hash);
        for tx in &self.transactions {
            bytes.extend_from_slice(&tx_digest(tx));
        }
        bytes
    }
}

/// SHA-256 digest over a block's stable byte encoding.
pub fn block_hash(block: &Block) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(block.hash_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

fn tx_digest(tx: &Transaction) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(tx).unwrap());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

/// Seconds since the unix epoch; block creation instants.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

/// Digests travel as lowercase hex strings on the wire.
pub mod hex_hash {
    use super::Hash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&s, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
