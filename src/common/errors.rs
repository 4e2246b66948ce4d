//! Common error types
//!
//! Every operation of the protocol core returns its success value or
//! exactly one of the error kinds below; no partial outputs are produced
//! on failure.

use blind_rsa_signatures::Error as BlindRsaError;
use hpke_rs::HpkeError;
use thiserror::Error;

use crate::TokenType;
use tls_codec::Error as TlsCodecError;

/// Serialization error
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Invalid serialized data")]
    /// Invalid serialized data
    InvalidData {
        /// Underlying TLS codec error that triggered the failure.
        #[source]
        source: TlsCodecError,
    },
}

/// Errors that can occur when blinding or unblinding EC public keys.
#[derive(PartialEq, Eq, Error, Debug)]
pub enum KeyBlindingError {
    #[error("Invalid scalar")]
    /// Error when a scalar is zero or out of range for the curve order.
    InvalidScalar,
    #[error("Invalid point")]
    /// Error when an EC operation produced the identity or the encoding is
    /// not a valid curve point.
    InvalidPoint,
}

/// Errors that can occur when verifying a key-blinded signature.
#[derive(PartialEq, Eq, Error, Debug)]
pub enum BlindSignatureError {
    #[error("Invalid public key")]
    /// Error when the blinded public key does not decode to a curve point.
    InvalidPublicKey,
    #[error("Invalid signature")]
    /// Error when the signature does not verify.
    InvalidSignature,
}

/// Errors that can occur when sealing or opening an origin name.
#[derive(Error, Debug)]
pub enum OriginEncryptionError {
    #[error("Unsupported ciphersuite")]
    /// Error when the ciphersuite is not the canonical one.
    UnsupportedSuite,
    #[error("Origin name sealing failed")]
    /// Error when HPKE sealing fails.
    SealFailure {
        /// Underlying HPKE error that triggered the failure.
        #[source]
        source: HpkeError,
    },
    #[error("Origin name decryption failed")]
    /// Error when the AEAD tag does not verify, the encapsulation is
    /// malformed, or the plaintext is not valid UTF-8.
    DecryptFailure,
}

/// Errors that can occur when creating a keypair.
#[derive(Error, Debug)]
pub enum CreateKeypairError {
    #[error("Name key derivation failed")]
    /// Error when deriving the HPKE name key from a seed fails.
    SeedError {
        /// Underlying HPKE error that triggered the failure.
        #[source]
        source: HpkeError,
    },
    #[error("Key generation failed")]
    /// Error when generating an RSA keypair fails.
    KeyGenerationFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Key serialization failed")]
    /// Error when serializing the public key fails.
    KeySerializationFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Invalid key size")]
    /// Error when the RSA modulus is not 4096 bits.
    InvalidKeySize,
    #[error("Invalid client key")]
    /// Error when the client EC key cannot be created from the given
    /// scalar bytes.
    InvalidClientKey {
        /// Underlying key blinding error that triggered the failure.
        #[source]
        source: KeyBlindingError,
    },
}

/// Errors that can occur when issuing token requests.
#[derive(Error, Debug)]
pub enum IssueTokenRequestError {
    #[error("Token blinding error")]
    /// Error when blinding the token input.
    BlindingError {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Key blinding error")]
    /// Error when blinding the client public key.
    KeyBlindingError {
        /// Underlying key blinding error that triggered the failure.
        #[source]
        source: KeyBlindingError,
    },
    #[error("Origin name encryption error")]
    /// Error when sealing the origin name.
    OriginEncryptionError {
        /// Underlying origin encryption error that triggered the failure.
        #[source]
        source: OriginEncryptionError,
    },
}

/// Errors that can occur when evaluating a token request.
///
/// The precise kind is for local consumption (logging, metrics). A
/// transport handing the result back to a client should map every variant
/// to one uniform rejection so that `MalformedRequest`, `DecryptFailure`
/// and `UnknownOrigin` remain indistinguishable on the wire.
#[derive(Error, Debug)]
pub enum EvaluateError {
    #[error("Malformed token request")]
    /// Error when the request is numerically out of range or addressed to
    /// the wrong token key.
    MalformedRequest,
    #[error("Origin name decryption failed")]
    /// Error when the encrypted origin name cannot be opened.
    DecryptFailure {
        /// Underlying origin encryption error that triggered the failure.
        #[source]
        source: OriginEncryptionError,
    },
    #[error("Unknown origin")]
    /// Error when the decrypted origin name is not registered.
    UnknownOrigin,
    #[error("Key blinding error")]
    /// Error when blinding the index request fails.
    KeyBlindingError {
        /// Underlying key blinding error that triggered the failure.
        #[source]
        source: KeyBlindingError,
    },
    #[error("Blind signature failed")]
    /// Error when the blind RSA signature cannot be computed.
    BlindSignatureFailed {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
}

/// Errors that can occur when issuing tokens.
#[derive(Error, Debug)]
pub enum IssueTokenError {
    #[error("Invalid signature")]
    /// Error when the unblinded RSA-PSS signature fails verification under
    /// the issuer public key.
    InvalidSignature {
        /// Underlying RSA error that triggered the failure.
        #[source]
        source: BlindRsaError,
    },
    #[error("Key blinding error")]
    /// Error when unblinding the index key fails.
    KeyBlindingError {
        /// Underlying key blinding error that triggered the failure.
        #[source]
        source: KeyBlindingError,
    },
}

/// Errors that can occur when redeeming a token at the origin.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RedeemTokenError {
    #[error("Token type mismatch: expected {expected:?}, found {found:?}")]
    /// Error when the token type does not match the expected type.
    TokenTypeMismatch {
        /// Expected token type.
        expected: TokenType,
        /// Token type found in the token.
        found: TokenType,
    },
    #[error("Invalid {token_type:?} token signature")]
    /// Error when the token signature verification fails.
    InvalidSignature {
        /// Token type that was being redeemed.
        token_type: TokenType,
    },
    #[error("Anonymous origin ID mismatch")]
    /// Error when the presented anonymous origin ID does not match the one
    /// derived from the client public key.
    AnonOriginIdMismatch,
    #[error("Key blinding error")]
    /// Error when deriving the index key from the client public key fails.
    KeyBlindingError {
        /// Underlying key blinding error that triggered the failure.
        #[source]
        source: KeyBlindingError,
    },
}
