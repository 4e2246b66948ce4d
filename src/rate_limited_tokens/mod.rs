//! # Rate-limited tokens
//!
//! Publicly verifiable tokens (token type 0x0003) whose issuance is
//! rate-limitable per (client, origin) pair. The issuer blind-signs the
//! token input under RSA-PSS and multiplies the client's blinded index
//! request by a per-origin scalar; client and origin independently derive
//! the same anonymous origin ID from the result.

pub mod client;
pub mod server;

use sha2::{Digest, Sha256};
use tls_codec::{Deserialize, TlsByteVecU16};
use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::common::errors::{CreateKeypairError, SerializationError};
use crate::{AnonOriginId, ChallengeDigest, Nonce, TokenKeyId, TokenType};

pub use crate::key_blinding::NE;
pub use blind_rsa_signatures::{KeyPair, Options, PublicKey};

/// Size of the authenticator and the blinded message (RSA-4096)
pub const NK: usize = 512;

/// Converts an RSA public key to a token key ID, the SHA-256 digest of its
/// DER-encoded `SubjectPublicKeyInfo`.
///
/// # Errors
/// Returns an error if the public key cannot be serialized.
pub fn public_key_to_token_key_id(public_key: &PublicKey) -> Result<TokenKeyId, CreateKeypairError> {
    Ok(Sha256::digest(serialize_public_key(public_key)?).into())
}

/// Serializes a public key as a DER-encoded `SubjectPublicKeyInfo`.
///
/// # Errors
/// Returns an error if the public key cannot be serialized.
pub fn serialize_public_key(public_key: &PublicKey) -> Result<Vec<u8>, CreateKeypairError> {
    public_key
        .to_spki(Some(&Options::default()))
        .map_err(|source| CreateKeypairError::KeySerializationFailed { source })
}

/// Computes the anonymous origin ID over the length-framed client public
/// key and index key encodings:
///
/// `SHA-256(len(client_key_enc) || client_key_enc || len(index_key_enc) || index_key_enc)`
///
/// with lengths as big-endian `u16`. The framing is part of the wire
/// contract.
#[must_use]
pub fn compute_index(client_key_enc: &[u8; NE], index_key_enc: &[u8; NE]) -> AnonOriginId {
    let mut hasher = Sha256::new();
    hasher.update((NE as u16).to_be_bytes());
    hasher.update(client_key_enc);
    hasher.update((NE as u16).to_be_bytes());
    hasher.update(index_key_enc);
    hasher.finalize().into()
}

/// Token request as specified in the spec:
///
/// ```c
/// struct {
///     uint8_t truncated_token_key_id;
///     uint8_t blinded_msg[Nk];
///     uint8_t request_key[Ne];
///     opaque encrypted_origin_name<0..2^16-1>;
///  } TokenRequest;
/// ```
#[derive(Debug, Clone, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct TokenRequest {
    pub(crate) truncated_token_key_id: u8,
    pub(crate) blinded_msg: [u8; NK],
    pub(crate) request_key: [u8; NE],
    pub(crate) encrypted_origin_name: TlsByteVecU16,
}

impl TokenRequest {
    /// Create a new `TokenRequest` from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the byte slice is not a valid `TokenRequest`.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut bytes = bytes;
        Self::tls_deserialize(&mut bytes)
            .map_err(|source| SerializationError::InvalidData { source })
    }
}

/// Token response as specified in the spec:
///
/// ```c
/// struct {
///     uint8_t blind_sig[Nk];
///     uint8_t blinded_request_key[Ne];
///  } TokenResponse;
/// ```
#[derive(Debug, Clone, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct TokenResponse {
    pub(crate) blind_sig: [u8; NK],
    pub(crate) blinded_request_key: [u8; NE],
}

impl TokenResponse {
    /// Create a new `TokenResponse` from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the byte slice is not a valid `TokenResponse`.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut bytes = bytes;
        Self::tls_deserialize(&mut bytes)
            .map_err(|source| SerializationError::InvalidData { source })
    }
}

/// A rate-limited token:
///
/// ```c
/// struct {
///     uint16_t token_type = 0x0003;
///     uint8_t nonce[32];
///     uint8_t challenge_digest[32];
///     uint8_t token_key_id[32];
///     uint8_t authenticator[Nk];
/// } Token;
/// ```
#[derive(Clone, Debug, PartialEq, TlsDeserialize, TlsSerialize, TlsSize)]
pub struct Token {
    token_type: TokenType,
    nonce: Nonce,
    challenge_digest: ChallengeDigest,
    token_key_id: TokenKeyId,
    authenticator: [u8; NK],
}

impl Token {
    /// Creates a new Token.
    #[must_use]
    pub const fn new(
        token_type: TokenType,
        nonce: Nonce,
        challenge_digest: ChallengeDigest,
        token_key_id: TokenKeyId,
        authenticator: [u8; NK],
    ) -> Self {
        Self {
            token_type,
            nonce,
            challenge_digest,
            token_key_id,
            authenticator,
        }
    }

    /// Create a new `Token` from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the byte slice is not a valid `Token`.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut bytes = bytes;
        Self::tls_deserialize(&mut bytes)
            .map_err(|source| SerializationError::InvalidData { source })
    }

    /// Returns the token type.
    #[must_use]
    pub const fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Returns the nonce.
    #[must_use]
    pub const fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Returns the challenge digest.
    #[must_use]
    pub const fn challenge_digest(&self) -> &ChallengeDigest {
        &self.challenge_digest
    }

    /// Returns the token key ID.
    #[must_use]
    pub const fn token_key_id(&self) -> &TokenKeyId {
        &self.token_key_id
    }

    /// Returns the authenticator.
    #[must_use]
    pub fn authenticator(&self) -> &[u8] {
        self.authenticator.as_ref()
    }
}
