//! # Rate-Limited Privacy Pass
//!
//! A Rust implementation of the cryptographic core of the rate-limited
//! token issuance protocol from the Privacy Pass IETF WG
//! [documents](https://datatracker.ietf.org/wg/privacypass/documents/).
//!
//! A client obtains unlinkable, single-use tokens (token type 0x0003) from
//! an issuer. The origin name travels to the issuer under HPKE, the token
//! itself is a blind RSA-PSS signature, and a multiplicatively blinded
//! P-384 key pair yields a per-(client, origin) anonymous origin ID that
//! lets issuer and origin rate-limit without learning the client identity
//! or linking it across origins.
//!
//! The library implements the client, the issuer, and the origin-side
//! verification of issued tokens.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod blind_ed25519;
pub mod common;
pub mod key_blinding;
pub mod origin_encryption;
pub mod rate_limited_tokens;

use tls_codec_derive::{TlsDeserialize, TlsSerialize, TlsSize};

pub use tls_codec::{Deserialize, Serialize};

/// Token type
#[derive(TlsSize, TlsSerialize, TlsDeserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum TokenType {
    /// Rate-limited token
    RateLimited = 3,
}

/// Truncated token key ID
pub type TruncatedTokenKeyId = u8;
/// Token key ID
pub type TokenKeyId = [u8; 32];
/// Name key ID
pub type NameKeyId = [u8; 32];
/// Nonce
pub type Nonce = [u8; 32];
/// Challenge digest
pub type ChallengeDigest = [u8; 32];
/// Anonymous origin ID
pub type AnonOriginId = [u8; 32];

pub(crate) fn truncate_token_key_id(token_key_id: &TokenKeyId) -> TruncatedTokenKeyId {
    *token_key_id.first().unwrap_or(&0)
}

#[derive(Debug)]
pub(crate) struct TokenInput {
    token_type: TokenType,
    nonce: Nonce,
    challenge_digest: ChallengeDigest,
    token_key_id: TokenKeyId,
}

impl TokenInput {
    pub(crate) const fn new(
        token_type: TokenType,
        nonce: Nonce,
        challenge_digest: ChallengeDigest,
        token_key_id: TokenKeyId,
    ) -> Self {
        Self {
            token_type,
            nonce,
            challenge_digest,
            token_key_id,
        }
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        // token_input = concat(0x0003, nonce, challenge_digest, token_key_id)
        let mut token_input: Vec<u8> = Vec::new();
        token_input.extend_from_slice((self.token_type as u16).to_be_bytes().as_slice());
        token_input.extend_from_slice(self.nonce.as_slice());
        token_input.extend_from_slice(self.challenge_digest.as_slice());
        token_input.extend_from_slice(self.token_key_id.as_slice());
        token_input
    }
}
