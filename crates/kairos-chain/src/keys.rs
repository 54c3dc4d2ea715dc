//! Flat-keyspace key encoding.

use kairos_types::Hash;

/// Tip pointer key; its value is the latest block hash.
pub const LATEST_KEY: &[u8] = b"latest";

/// Key of a block body: `"block#" ‖ hash`.
pub fn block_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(6 + 32);
    key.extend_from_slice(b"block#");
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Key of the height index entry: `"height#" ‖ big_endian_u64(height)`.
pub fn height_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(7 + 8);
    key.extend_from_slice(b"height#");
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Key of a stored transaction: `"tx#" ‖ tx_hash`.
pub fn tx_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(3 + 32);
    key.extend_from_slice(b"tx#");
    key.extend_from_slice(hash.as_bytes());
    key
}
