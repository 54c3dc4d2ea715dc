//! Blocks and block headers.

use crate::{merkle_root, CodecError, CodecResult, CompressedPublicKey, Hash, Transaction};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// VRF election parameters carried in the header's opaque blob.
///
/// `result` is the proof point Γ in SEC1 compressed form, `s` and `t` are
/// big-endian scalar bytes, and `random_number` is the round's input α.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfParams {
    /// Compressed proof point Γ.
    pub result: Vec<u8>,
    /// Scalar s, big-endian.
    pub s: Vec<u8>,
    /// Scalar t, big-endian.
    pub t: Vec<u8>,
    /// Round randomness α.
    pub random_number: [u8; 32],
}

impl VrfParams {
    /// Serialize to the header blob.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Deserialize from the header blob.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Creation time in ms since epoch, logical clock.
    pub timestamp: i64,
    /// Hash of the parent header.
    pub prev_hash: Hash,
    /// Hash of this header.
    pub hash: Hash,
    /// Merkle root of the transaction list.
    pub merkle_root: Hash,
    /// Zero-based chain position.
    pub height: u64,
    /// Compressed public key of the proposer.
    pub public_key: CompressedPublicKey,
    /// Opaque VRF parameter blob, see [`VrfParams`].
    pub params: Vec<u8>,
}

/// A block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered transaction list.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block hash, as recorded in the header.
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Block height.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// True for the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.height == crate::GENESIS_HEIGHT
    }

    /// Compute the header hash: Blake2b-256 of the header with the hash
    /// field zeroed.
    pub fn compute_hash(&self) -> Hash {
        let unhashed = BlockHeader {
            hash: Hash::ZERO,
            ..self.header.clone()
        };
        let bytes = bincode::serialize(&unhashed).expect("header is serializable");
        let digest = Blake2b::<U32>::digest(&bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash(out)
    }

    /// True when the recorded Merkle root matches the transaction list.
    pub fn merkle_root_matches(&self) -> bool {
        merkle_root(&self.transactions) == self.header.merkle_root
    }

    /// Check the structural link to a parent block: height, timestamp and
    /// parent hash. VRF verification is a separate concern.
    pub fn extends(&self, parent: &Block) -> bool {
        self.header.height == parent.header.height + 1
            && self.header.timestamp >= parent.header.timestamp
            && self.header.prev_hash == parent.header.hash
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}
