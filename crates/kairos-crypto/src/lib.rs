//! # kairos-crypto
//!
//! Cryptographic seams for the kairos node:
//! - secp256k1 key handling ([`bytes_to_public_key`], [`Keypair`])
//! - ECDSA transaction signatures over the tx body hash
//! - the consensus VRF seam ([`ConsensusVerifier`]) with a Schnorr-style
//!   EC-VRF default implementation ([`EcVrf`])
//!
//! The handler layer only ever talks to [`ConsensusVerifier`], so the VRF
//! math can be swapped for an external library without touching dispatch.

mod error;
mod keys;
mod vrf;

pub use error::{CryptoError, CryptoResult};
pub use keys::{
    address_of, bytes_to_public_key, sign_tx_body, verify_transaction, verify_tx_signature,
    Keypair,
};
pub use vrf::{ConsensusVerifier, EcVrf};
