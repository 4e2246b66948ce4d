//! # EC key blinding
//!
//! Multiplicative blinding of P-384 public keys. A public key `P` blinded
//! with a scalar `r` becomes `r·P`; unblinding multiplies by `r⁻¹ mod n`.
//! Blinded and unblinded keys are carried as compressed SEC1 encodings.

use p384::{
    elliptic_curve::{
        bigint::U384,
        ops::{Invert, Reduce},
        rand_core::CryptoRngCore,
        sec1::ToEncodedPoint,
    },
    FieldBytes, NonZeroScalar, PublicKey, Scalar, SecretKey,
};

use crate::common::errors::KeyBlindingError;

/// Size of a compressed SEC1 element
pub const NE: usize = 49;
/// Size of a serialized scalar
pub const NS: usize = 48;

/// Creates an EC key from big-endian scalar bytes, reduced modulo the
/// curve order. Inputs shorter than a full scalar are left-padded.
///
/// # Errors
/// Returns `InvalidScalar` if the input is longer than a scalar or reduces
/// to zero.
pub fn create_key(scalar_bytes: &[u8]) -> Result<SecretKey, KeyBlindingError> {
    if scalar_bytes.len() > NS {
        return Err(KeyBlindingError::InvalidScalar);
    }
    let mut padded = FieldBytes::default();
    padded[NS - scalar_bytes.len()..].copy_from_slice(scalar_bytes);
    // Interpret as a big-endian integer, reduced modulo the curve order.
    let scalar = Scalar::reduce(U384::from_be_slice(&padded));
    let scalar = Option::<NonZeroScalar>::from(NonZeroScalar::new(scalar))
        .ok_or(KeyBlindingError::InvalidScalar)?;
    Ok(SecretKey::from(scalar))
}

/// Generates a fresh EC key with a uniformly random non-zero scalar.
pub fn generate_key<R: CryptoRngCore>(rng: &mut R) -> SecretKey {
    SecretKey::random(rng)
}

/// Multiplies a public key by the blinding scalar.
///
/// # Errors
/// Returns `InvalidPoint` if the result is the point at infinity.
pub fn blind_public_key(
    public_key: &PublicKey,
    blind: &SecretKey,
) -> Result<PublicKey, KeyBlindingError> {
    let blinded = public_key.to_projective() * *blind.to_nonzero_scalar();
    PublicKey::from_affine(blinded.to_affine()).map_err(|_| KeyBlindingError::InvalidPoint)
}

/// Multiplies a public key by the inverse of the blinding scalar, undoing
/// [`blind_public_key`].
///
/// # Errors
/// Returns `InvalidPoint` if the result is the point at infinity.
pub fn unblind_public_key(
    public_key: &PublicKey,
    blind: &SecretKey,
) -> Result<PublicKey, KeyBlindingError> {
    let inverse = blind.to_nonzero_scalar().invert();
    let unblinded = public_key.to_projective() * *inverse;
    PublicKey::from_affine(unblinded.to_affine()).map_err(|_| KeyBlindingError::InvalidPoint)
}

/// Serializes a public key with compressed SEC1 encoding.
#[must_use]
pub fn serialize_public_key(public_key: &PublicKey) -> [u8; NE] {
    let encoded = public_key.to_encoded_point(true);
    let mut out = [0u8; NE];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Deserializes a public key from a SEC1 encoding.
///
/// # Errors
/// Returns `InvalidPoint` if the bytes are not a valid curve point.
pub fn deserialize_public_key(bytes: &[u8]) -> Result<PublicKey, KeyBlindingError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| KeyBlindingError::InvalidPoint)
}
