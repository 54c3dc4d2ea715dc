//! # kairos-types
//!
//! Core data model for the kairos chain:
//! - Blocks and block headers with VRF election parameters
//! - Content-addressed transactions
//! - Merkle root computation over transaction lists
//! - Binary codec helpers (bincode-backed)
//!
//! Wire-level message records live in `kairos-network`; this crate only
//! defines what is stored and gossiped, not how it is framed.

mod block;
mod clock;
mod error;
mod hash;
mod merkle;
mod transaction;

pub use block::{Block, BlockHeader, VrfParams};
pub use clock::{Clock, SystemClock};
pub use error::{CodecError, CodecResult};
pub use hash::{Address, CompressedPublicKey, Hash};
pub use merkle::merkle_root;
pub use transaction::{Transaction, TxBody};

/// Height of the genesis block.
pub const GENESIS_HEIGHT: u64 = 0;
