//! # Origin name encryption
//!
//! The client seals the origin name to the issuer with HPKE. The HPKE
//! `info` string commits to the truncated token key ID, the blinded RSA
//! message and the index request, so an encrypted origin name cannot be
//! replayed under a different token request.
//!
//! Only the (DHKEM-X25519, HKDF-SHA256, AES-128-GCM) ciphersuite is
//! supported; everything else is rejected before any key derivation.

use std::fmt;

use hpke_rs::prelude::*;
use hpke_rs_crypto::types::{AeadAlgorithm, KdfAlgorithm, KemAlgorithm};
use hpke_rs_rust_crypto::HpkeRustCrypto;
use sha2::{Digest, Sha256};

use crate::common::errors::{CreateKeypairError, OriginEncryptionError};
use crate::{NameKeyId, TruncatedTokenKeyId};

/// KEM ID of the fixed ciphersuite (DHKEM-X25519, HKDF-SHA256)
pub const KEM_ID: u16 = 0x0020;
/// KDF ID of the fixed ciphersuite (HKDF-SHA256)
pub const KDF_ID: u16 = 0x0001;
/// AEAD ID of the fixed ciphersuite (AES-128-GCM)
pub const AEAD_ID: u16 = 0x0001;

/// Label prefixing the HPKE info string that binds the sealed origin name
/// to the outer token request.
pub const HPKE_INFO_LABEL: &[u8] = b"TokenRequest";

/// Size of a name key seed
pub const NSEED: usize = 32;
/// Size of a KEM encapsulation
pub const NENC: usize = 32;

fn hpke() -> Hpke<HpkeRustCrypto> {
    Hpke::new(
        HpkeMode::Base,
        KemAlgorithm::DhKem25519,
        KdfAlgorithm::HkdfSha256,
        AeadAlgorithm::Aes128Gcm,
    )
}

/// Checks a `(kem_id, kdf_id, aead_id)` triple against the fixed
/// ciphersuite.
///
/// # Errors
/// Returns `UnsupportedSuite` for any other triple.
pub const fn check_ciphersuite(
    kem_id: u16,
    kdf_id: u16,
    aead_id: u16,
) -> Result<(), OriginEncryptionError> {
    if kem_id == KEM_ID && kdf_id == KDF_ID && aead_id == AEAD_ID {
        Ok(())
    } else {
        Err(OriginEncryptionError::UnsupportedSuite)
    }
}

/// The issuer's public name key, distributed to clients out of band.
#[derive(Clone, Debug)]
pub struct PublicNameKey {
    public_key: HpkePublicKey,
}

impl PublicNameKey {
    /// Creates a public name key from its canonical KEM encoding.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            public_key: HpkePublicKey::new(bytes),
        }
    }

    /// Returns the canonical KEM encoding of the key.
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        self.public_key.as_slice().to_vec()
    }

    /// Returns the name key ID, the SHA-256 digest of the canonical
    /// encoding.
    #[must_use]
    pub fn key_id(&self) -> NameKeyId {
        Sha256::digest(self.public_key.as_slice()).into()
    }
}

/// The issuer's private name key.
pub struct PrivateNameKey {
    private_key: HpkePrivateKey,
    public_key: PublicNameKey,
}

impl fmt::Debug for PrivateNameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateNameKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl PrivateNameKey {
    /// Derives a name key pair deterministically from a seed using the
    /// KEM's `DeriveKeyPair`.
    ///
    /// # Errors
    /// Returns `SeedError` if the KEM rejects the seed.
    pub fn from_seed(seed: &[u8; NSEED]) -> Result<Self, CreateKeypairError> {
        let key_pair = hpke()
            .derive_key_pair(seed)
            .map_err(|source| CreateKeypairError::SeedError { source })?;
        let (private_key, public_key) = key_pair.into_keys();
        Ok(Self {
            private_key,
            public_key: PublicNameKey { public_key },
        })
    }

    /// Returns the public half of the name key.
    #[must_use]
    pub const fn public(&self) -> &PublicNameKey {
        &self.public_key
    }
}

fn request_info(
    truncated_token_key_id: TruncatedTokenKeyId,
    blinded_msg: &[u8],
    request_key: &[u8],
) -> Vec<u8> {
    let mut info =
        Vec::with_capacity(HPKE_INFO_LABEL.len() + 1 + blinded_msg.len() + request_key.len());
    info.extend_from_slice(HPKE_INFO_LABEL);
    info.push(truncated_token_key_id);
    info.extend_from_slice(blinded_msg);
    info.extend_from_slice(request_key);
    info
}

/// Seals an origin name to the issuer's name key, bound to the token
/// request fields. Returns the concatenation `enc || ct`.
///
/// # Errors
/// Returns `SealFailure` if HPKE sealing fails.
pub fn encrypt_origin_name(
    name_key: &PublicNameKey,
    truncated_token_key_id: TruncatedTokenKeyId,
    blinded_msg: &[u8],
    request_key: &[u8],
    origin_name: &str,
) -> Result<Vec<u8>, OriginEncryptionError> {
    let info = request_info(truncated_token_key_id, blinded_msg, request_key);
    let (enc, ct) = hpke()
        .seal(
            &name_key.public_key,
            &info,
            &[],
            origin_name.as_bytes(),
            None,
            None,
            None,
        )
        .map_err(|source| OriginEncryptionError::SealFailure { source })?;
    debug_assert_eq!(enc.len(), NENC);

    let mut encrypted_origin_name = enc;
    encrypted_origin_name.extend_from_slice(&ct);
    Ok(encrypted_origin_name)
}

/// Opens an encrypted origin name bound to the token request fields.
///
/// # Errors
/// Returns `DecryptFailure` if the encapsulation is malformed, the AEAD
/// tag does not verify, or the plaintext is not UTF-8.
pub fn decrypt_origin_name(
    name_key: &PrivateNameKey,
    truncated_token_key_id: TruncatedTokenKeyId,
    blinded_msg: &[u8],
    request_key: &[u8],
    encrypted_origin_name: &[u8],
) -> Result<String, OriginEncryptionError> {
    let (enc, ct) = encrypted_origin_name
        .split_at_checked(NENC)
        .ok_or(OriginEncryptionError::DecryptFailure)?;
    let info = request_info(truncated_token_key_id, blinded_msg, request_key);
    let origin_name = hpke()
        .open(enc, &name_key.private_key, &info, &[], ct, None, None, None)
        .map_err(|_| OriginEncryptionError::DecryptFailure)?;
    String::from_utf8(origin_name).map_err(|_| OriginEncryptionError::DecryptFailure)
}
