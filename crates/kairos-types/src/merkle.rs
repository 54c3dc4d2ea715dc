//! Merkle root over transaction lists.

use crate::{Hash, Transaction};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Compute the Merkle root of a transaction list.
///
/// Leaves are the transaction body hashes. An odd node at any level is
/// paired with itself. The empty list yields the zero hash.
pub fn merkle_root(txs: &[Transaction]) -> Hash {
    if txs.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = txs.iter().map(|tx| tx.hash()).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        level = next;
    }

    level[0]
}
