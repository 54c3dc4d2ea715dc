//! secp256k1 key handling and transaction signatures.

use crate::{CryptoError, CryptoResult};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use kairos_types::{Address, CompressedPublicKey, Hash, Transaction};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Reconstruct a secp256k1 public key from its SEC1 compressed bytes.
pub fn bytes_to_public_key(bytes: &CompressedPublicKey) -> CryptoResult<PublicKey> {
    PublicKey::from_slice(bytes.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)
}

/// A node keypair.
#[derive(Debug, Clone)]
pub struct Keypair {
    /// Secret key.
    pub secret: SecretKey,
    /// Public key.
    pub public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secret, public }
    }

    /// Build from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secret, public })
    }

    /// The SEC1 compressed form of the public key, as carried in headers.
    pub fn compressed_public(&self) -> CompressedPublicKey {
        CompressedPublicKey(self.public.serialize())
    }
}

/// Sign a transaction body hash, returning the DER-encoded signature.
pub fn sign_tx_body(secret: &SecretKey, body_hash: &Hash) -> Vec<u8> {
    let secp = Secp256k1::new();
    let msg = Message::from_digest(*body_hash.as_bytes());
    secp.sign_ecdsa(&msg, secret).serialize_der().to_vec()
}

/// Derive the account address of a public key: the trailing 20 bytes of
/// its Blake2b-256 digest.
pub fn address_of(public_key: &CompressedPublicKey) -> Address {
    let digest = Blake2b::<U32>::digest(public_key.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..32]);
    Address(out)
}

/// Full transaction check: content hash, sender derivation and signature.
pub fn verify_transaction(tx: &Transaction) -> CryptoResult<bool> {
    if !tx.hash_matches() {
        return Ok(false);
    }
    if tx.body.sender != address_of(&tx.body.public_key) {
        return Ok(false);
    }
    verify_tx_signature(&tx.body.public_key, &tx.body.hash, &tx.signature)
}

/// Verify a DER-encoded signature over a transaction body hash.
pub fn verify_tx_signature(
    public_key: &CompressedPublicKey,
    body_hash: &Hash,
    signature: &[u8],
) -> CryptoResult<bool> {
    let secp = Secp256k1::new();
    let pk = bytes_to_public_key(public_key)?;
    let msg = Message::from_digest(*body_hash.as_bytes());
    let sig = match Signature::from_der(signature) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_roundtrip() {
        let keypair = Keypair::generate();
        let compressed = keypair.compressed_public();
        let restored = bytes_to_public_key(&compressed).unwrap();
        assert_eq!(restored, keypair.public);
    }

    #[test]
    fn test_invalid_key_bytes_rejected() {
        // 0x05 is not a valid SEC1 compressed prefix.
        let bogus = CompressedPublicKey([0x05; 33]);
        assert!(bytes_to_public_key(&bogus).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let hash = Hash([0x11; 32]);
        let sig = sign_tx_body(&keypair.secret, &hash);

        assert!(verify_tx_signature(&keypair.compressed_public(), &hash, &sig).unwrap());

        let other = Hash([0x22; 32]);
        assert!(!verify_tx_signature(&keypair.compressed_public(), &other, &sig).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_false_not_error() {
        let keypair = Keypair::generate();
        let hash = Hash([0x11; 32]);
        let verified = verify_tx_signature(&keypair.compressed_public(), &hash, b"nonsense");
        assert!(!verified.unwrap());
    }

    fn signed_tx(keypair: &Keypair) -> Transaction {
        let mut body = kairos_types::TxBody {
            hash: Hash::ZERO,
            sender: address_of(&keypair.compressed_public()),
            receiver: Address([9u8; 20]),
            public_key: keypair.compressed_public(),
            payload: b"payment".to_vec(),
            timestamp: 1_700_000_000_000,
        };
        body.hash = body.compute_hash();
        let signature = sign_tx_body(&keypair.secret, &body.hash);
        Transaction { body, signature }
    }

    #[test]
    fn test_verify_transaction() {
        let keypair = Keypair::generate();
        let tx = signed_tx(&keypair);
        assert!(verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_verify_transaction_rejects_tampered_payload() {
        let keypair = Keypair::generate();
        let mut tx = signed_tx(&keypair);
        tx.body.payload = b"altered".to_vec();
        assert!(!verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_verify_transaction_rejects_wrong_sender() {
        let keypair = Keypair::generate();
        let mut tx = signed_tx(&keypair);
        tx.body.sender = Address([0xff; 20]);
        tx.body.hash = tx.body.compute_hash();
        tx.signature = sign_tx_body(&keypair.secret, &tx.body.hash);
        assert!(!verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_address_is_deterministic() {
        let keypair = Keypair::generate();
        let key = keypair.compressed_public();
        assert_eq!(address_of(&key), address_of(&key));
    }
}
