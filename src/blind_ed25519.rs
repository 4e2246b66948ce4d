//! # Key-blinded Ed25519 signatures
//!
//! Deterministic Ed25519-style signing where every call takes a 32-byte
//! blind. The blind multiplies into the secret scalar and is folded into
//! the nonce derivation, so signatures over the same message under the
//! same key are unlinkable across blinds while verifying under the
//! correspondingly blinded public key.

use std::fmt;

use curve25519_dalek::{
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::{clamp_integer, Scalar},
};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::common::errors::BlindSignatureError;

/// Size of a signature
pub const SIGNATURE_LEN: usize = 64;
/// Size of a blind
pub const BLIND_LEN: usize = 32;
/// Size of a key seed
pub const SEED_LEN: usize = 32;

/// An Ed25519 signing key that only produces key-blinded signatures.
pub struct SigningKey {
    seed: [u8; SEED_LEN],
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl SigningKey {
    /// Generates a fresh signing key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; SEED_LEN];
        rng.fill_bytes(&mut seed);
        Self { seed }
    }

    /// Creates a signing key from a seed.
    #[must_use]
    pub const fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self { seed }
    }

    /// Returns the public key the signature for a given blind verifies
    /// under: `(b·s)·B` with `s` the clamped secret scalar and `b` the
    /// clamped blind.
    #[must_use]
    pub fn blinded_verifying_key(&self, blind: &[u8; BLIND_LEN]) -> [u8; 32] {
        let (scalar, _) = self.expand();
        let blinded_scalar = scalar * Scalar::from_bytes_mod_order(clamp_integer(*blind));
        EdwardsPoint::mul_base(&blinded_scalar).compress().to_bytes()
    }

    /// Signs a message under the key blinded with `blind`.
    ///
    /// The signature is deterministic in `(key, message, blind)`; both the
    /// nonce commitment and the response change with the blind.
    #[must_use]
    pub fn sign_with_blind(&self, message: &[u8], blind: &[u8; BLIND_LEN]) -> [u8; SIGNATURE_LEN] {
        let (scalar, prefix) = self.expand();
        let blinded_scalar = scalar * Scalar::from_bytes_mod_order(clamp_integer(*blind));
        let blinded_public = EdwardsPoint::mul_base(&blinded_scalar).compress();

        // r = H(prefix || blind || message), so the commitment half moves
        // with the blind as well as the response half.
        let mut h = Sha512::new();
        h.update(prefix);
        h.update(blind);
        h.update(message);
        let r = Scalar::from_hash(h);
        let commitment = EdwardsPoint::mul_base(&r).compress();

        let mut h = Sha512::new();
        h.update(commitment.as_bytes());
        h.update(blinded_public.as_bytes());
        h.update(message);
        let challenge = Scalar::from_hash(h);

        let response = r + challenge * blinded_scalar;

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..32].copy_from_slice(commitment.as_bytes());
        signature[32..].copy_from_slice(response.as_bytes());
        signature
    }

    fn expand(&self) -> (Scalar, [u8; 32]) {
        let digest = Sha512::digest(self.seed);
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&digest[..32]);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&digest[32..]);
        let scalar = Scalar::from_bytes_mod_order(clamp_integer(scalar_bytes));
        scalar_bytes.zeroize();
        (scalar, prefix)
    }
}

/// Verifies a signature under a blinded public key using the standard
/// Ed25519 equation.
///
/// # Errors
/// Returns `InvalidPublicKey` if the key does not decode, `InvalidSignature`
/// if the signature does not verify.
pub fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
) -> Result<(), BlindSignatureError> {
    let point = CompressedEdwardsY(*public_key)
        .decompress()
        .ok_or(BlindSignatureError::InvalidPublicKey)?;

    let mut commitment = [0u8; 32];
    commitment.copy_from_slice(&signature[..32]);
    let mut response_bytes = [0u8; 32];
    response_bytes.copy_from_slice(&signature[32..]);
    let response = Option::<Scalar>::from(Scalar::from_canonical_bytes(response_bytes))
        .ok_or(BlindSignatureError::InvalidSignature)?;

    let mut h = Sha512::new();
    h.update(commitment);
    h.update(public_key);
    h.update(message);
    let challenge = Scalar::from_hash(h);

    // [response]B - [challenge]A == R
    let recomputed =
        EdwardsPoint::vartime_double_scalar_mul_basepoint(&-challenge, &point, &response);
    if recomputed.compress().to_bytes() == commitment {
        Ok(())
    } else {
        Err(BlindSignatureError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn signing_is_deterministic() {
        let key = SigningKey::from_seed([42u8; SEED_LEN]);
        let blind = [7u8; BLIND_LEN];
        assert_eq!(
            key.sign_with_blind(b"message", &blind),
            key.sign_with_blind(b"message", &blind)
        );
    }

    #[test]
    fn blind_rerandomizes_both_halves() {
        let key = SigningKey::generate(&mut OsRng);

        let mut message = [0u8; 32];
        OsRng.fill_bytes(&mut message);

        let mut blind1 = [0u8; BLIND_LEN];
        OsRng.fill_bytes(&mut blind1);
        let mut blind2 = [0u8; BLIND_LEN];
        OsRng.fill_bytes(&mut blind2);

        let signature1 = key.sign_with_blind(&message, &blind1);
        let signature2 = key.sign_with_blind(&message, &blind2);

        assert_ne!(signature1[..32], signature2[..32]);
        assert_ne!(signature1[32..], signature2[32..]);
    }

    #[test]
    fn verifies_under_blinded_key_only() {
        let key = SigningKey::generate(&mut OsRng);
        let blind = [3u8; BLIND_LEN];
        let other_blind = [4u8; BLIND_LEN];

        let signature = key.sign_with_blind(b"message", &blind);
        verify(&key.blinded_verifying_key(&blind), b"message", &signature).unwrap();

        assert_eq!(
            verify(
                &key.blinded_verifying_key(&other_blind),
                b"message",
                &signature
            )
            .unwrap_err(),
            BlindSignatureError::InvalidSignature
        );
    }

    #[test]
    fn tampered_message_fails() {
        let key = SigningKey::generate(&mut OsRng);
        let blind = [9u8; BLIND_LEN];
        let signature = key.sign_with_blind(b"message", &blind);
        assert_eq!(
            verify(&key.blinded_verifying_key(&blind), b"other", &signature).unwrap_err(),
            BlindSignatureError::InvalidSignature
        );
    }
}
