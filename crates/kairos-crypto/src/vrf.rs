//! Leader-election VRF: the verifier seam and the default EC-VRF.
//!
//! The construction is a Schnorr-style VRF over secp256k1:
//!
//! ```text
//! prove(x, α):   H = hash_to_curve(α, PK)      Γ = x·H
//!                k = nonce(x, α)               u = k·G   v = k·H
//!                t = challenge(Γ, u, v)        s = k − t·x (mod n)
//! verify:        u' = s·G + t·PK   v' = s·H + t·Γ
//!                accept  iff  challenge(Γ, u', v') == t
//! ```
//!
//! `result` carries Γ compressed, `s`/`t` are big-endian scalar bytes and
//! `random_number` is the round input α. Consumers only depend on
//! [`ConsensusVerifier`], so an external VRF library can replace [`EcVrf`].

use crate::{CryptoError, CryptoResult};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use kairos_types::VrfParams;
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};

const H2C_TAG: &[u8] = b"kairos/vrf/h2c/v1";
const NONCE_TAG: &[u8] = b"kairos/vrf/nonce/v1";
const CHALLENGE_TAG: &[u8] = b"kairos/vrf/challenge/v1";

/// Remote consensus verification seam.
///
/// `check_remote_consensus` returns `Ok(true)` only when the proof is
/// well-formed and verifies; malformed inputs surface as errors so callers
/// can fail closed.
pub trait ConsensusVerifier: Send + Sync {
    /// Verify a proposer's VRF proof for one election round.
    fn check_remote_consensus(
        &self,
        public_key: &PublicKey,
        result: &[u8],
        s: &[u8],
        t: &[u8],
        random_number: &[u8; 32],
    ) -> CryptoResult<bool>;
}

/// Default EC-VRF implementation.
pub struct EcVrf {
    secp: Secp256k1<All>,
}

impl EcVrf {
    /// Create a verifier/prover context.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Produce a proof for `random_number` under `secret`.
    ///
    /// Used by block producers and by tests that need verifying blocks.
    pub fn prove(&self, secret: &SecretKey, random_number: &[u8; 32]) -> CryptoResult<VrfParams> {
        let public = PublicKey::from_secret_key(&self.secp, secret);
        let h = self.hash_to_curve(&public, random_number)?;

        let x = scalar_of(secret);
        let gamma = h.mul_tweak(&self.secp, &x)?;

        let k = derive_nonce(secret, random_number)?;
        let u = PublicKey::from_secret_key(&self.secp, &k);
        let v = h.mul_tweak(&self.secp, &scalar_of(&k))?;

        let t = challenge_scalar(&gamma, &u, &v);

        // s = k − t·x  (mod n)
        let t_sk = SecretKey::from_slice(&t.to_be_bytes())
            .map_err(|_| CryptoError::InvalidScalar("zero challenge".into()))?;
        let tx = t_sk.mul_tweak(&x)?;
        let s = k.add_tweak(&scalar_of(&tx.negate()))?;

        Ok(VrfParams {
            result: gamma.serialize().to_vec(),
            s: s.secret_bytes().to_vec(),
            t: t.to_be_bytes().to_vec(),
            random_number: *random_number,
        })
    }

    /// Try-and-increment hash to a curve point, bound to the prover's key.
    fn hash_to_curve(&self, public: &PublicKey, alpha: &[u8; 32]) -> CryptoResult<PublicKey> {
        for ctr in 0u16..512 {
            let mut hasher = Blake2b::<U32>::new();
            hasher.update(H2C_TAG);
            hasher.update(public.serialize());
            hasher.update(alpha);
            hasher.update(ctr.to_be_bytes());
            let digest = hasher.finalize();

            let mut candidate = [0u8; 33];
            candidate[0] = 0x02;
            candidate[1..].copy_from_slice(&digest);

            if let Ok(point) = PublicKey::from_slice(&candidate) {
                return Ok(point);
            }
        }
        // Each attempt lands on the curve with probability ~1/2.
        Err(CryptoError::InvalidPoint)
    }
}

impl Default for EcVrf {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusVerifier for EcVrf {
    fn check_remote_consensus(
        &self,
        public_key: &PublicKey,
        result: &[u8],
        s: &[u8],
        t: &[u8],
        random_number: &[u8; 32],
    ) -> CryptoResult<bool> {
        let gamma = PublicKey::from_slice(result).map_err(|_| CryptoError::InvalidPoint)?;
        let s = parse_scalar(s)?;
        let t = parse_scalar(t)?;

        let h = self.hash_to_curve(public_key, random_number)?;

        // u' = s·G + t·PK
        let s_sk = SecretKey::from_slice(&s.to_be_bytes())
            .map_err(|_| CryptoError::InvalidScalar("zero s".into()))?;
        let sg = PublicKey::from_secret_key(&self.secp, &s_sk);
        let tpk = public_key.mul_tweak(&self.secp, &t)?;
        let u = sg.combine(&tpk)?;

        // v' = s·H + t·Γ
        let sh = h.mul_tweak(&self.secp, &s)?;
        let tgamma = gamma.mul_tweak(&self.secp, &t)?;
        let v = sh.combine(&tgamma)?;

        let expected = challenge_scalar(&gamma, &u, &v);
        Ok(expected.to_be_bytes() == t.to_be_bytes())
    }
}

fn scalar_of(secret: &SecretKey) -> Scalar {
    // A secret key is always a valid scalar below the group order.
    Scalar::from_be_bytes(secret.secret_bytes()).expect("secret key is in range")
}

/// Parse big-endian scalar bytes, tolerating inputs shorter than 32 bytes.
fn parse_scalar(bytes: &[u8]) -> CryptoResult<Scalar> {
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(CryptoError::InvalidScalar(format!(
            "bad scalar length {}",
            bytes.len()
        )));
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(bytes);
    Scalar::from_be_bytes(padded).map_err(|_| CryptoError::InvalidScalar("out of range".into()))
}

/// Deterministic proving nonce bound to the secret and the round input.
fn derive_nonce(secret: &SecretKey, alpha: &[u8; 32]) -> CryptoResult<SecretKey> {
    for ctr in 0u16..512 {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(NONCE_TAG);
        hasher.update(secret.secret_bytes());
        hasher.update(alpha);
        hasher.update(ctr.to_be_bytes());
        let digest = hasher.finalize();
        if let Ok(k) = SecretKey::from_slice(&digest) {
            return Ok(k);
        }
    }
    Err(CryptoError::InvalidScalar("nonce derivation failed".into()))
}

/// Challenge t = H(Γ ‖ u ‖ v), reduced to a scalar.
fn challenge_scalar(gamma: &PublicKey, u: &PublicKey, v: &PublicKey) -> Scalar {
    for ctr in 0u16..512 {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(CHALLENGE_TAG);
        hasher.update(gamma.serialize());
        hasher.update(u.serialize());
        hasher.update(v.serialize());
        hasher.update(ctr.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        if let Ok(scalar) = Scalar::from_be_bytes(bytes) {
            if scalar != Scalar::ZERO {
                return scalar;
            }
        }
    }
    // Probability of reaching this is ~2^-(128*512).
    unreachable!("challenge reduction failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;

    #[test]
    fn test_prove_verify_roundtrip() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();
        let alpha = [0x42u8; 32];

        let params = vrf.prove(&keypair.secret, &alpha).unwrap();
        let verified = vrf
            .check_remote_consensus(
                &keypair.public,
                &params.result,
                &params.s,
                &params.t,
                &params.random_number,
            )
            .unwrap();
        assert!(verified);
    }

    #[test]
    fn test_flipped_result_byte_rejected() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();
        let alpha = [0x42u8; 32];

        let mut params = vrf.prove(&keypair.secret, &alpha).unwrap();
        // Flip a byte of Γ's x-coordinate; either the point no longer parses
        // or the challenge no longer matches. Both must reject.
        params.result[10] ^= 0x01;
        let outcome = vrf.check_remote_consensus(
            &keypair.public,
            &params.result,
            &params.s,
            &params.t,
            &params.random_number,
        );
        assert!(!outcome.unwrap_or(false));
    }

    #[test]
    fn test_wrong_public_key_rejected() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let alpha = [0x42u8; 32];

        let params = vrf.prove(&keypair.secret, &alpha).unwrap();
        let verified = vrf
            .check_remote_consensus(
                &other.public,
                &params.result,
                &params.s,
                &params.t,
                &params.random_number,
            )
            .unwrap();
        assert!(!verified);
    }

    #[test]
    fn test_wrong_alpha_rejected() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();

        let params = vrf.prove(&keypair.secret, &[0x42u8; 32]).unwrap();
        let verified = vrf
            .check_remote_consensus(
                &keypair.public,
                &params.result,
                &params.s,
                &params.t,
                &[0x43u8; 32],
            )
            .unwrap();
        assert!(!verified);
    }

    #[test]
    fn test_malformed_scalar_is_error() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();
        let alpha = [0x42u8; 32];

        let params = vrf.prove(&keypair.secret, &alpha).unwrap();
        let outcome = vrf.check_remote_consensus(
            &keypair.public,
            &params.result,
            &[0u8; 40],
            &params.t,
            &params.random_number,
        );
        assert!(outcome.is_err());
    }

    #[test]
    fn test_proofs_are_deterministic() {
        let vrf = EcVrf::new();
        let keypair = Keypair::generate();
        let alpha = [0x07u8; 32];

        let a = vrf.prove(&keypair.secret, &alpha).unwrap();
        let b = vrf.prove(&keypair.secret, &alpha).unwrap();
        assert_eq!(a, b);
    }
}
