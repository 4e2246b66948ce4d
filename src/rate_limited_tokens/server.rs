//! Issuer-side and origin-side implementation of the rate-limited token
//! protocol.

use std::collections::HashMap;
use std::sync::RwLock;

use blind_rsa_signatures::reexports::rsa::PublicKeyParts;
use blind_rsa_signatures::{KeyPair, Options, PublicKey, Signature};
use log::warn;
use p384::{PublicKey as EcPublicKey, SecretKey as EcSecretKey};
use rand::{CryptoRng, RngCore};

use crate::{
    common::errors::{CreateKeypairError, EvaluateError, KeyBlindingError, RedeemTokenError},
    key_blinding::{
        blind_public_key, deserialize_public_key, generate_key,
        serialize_public_key as serialize_ec_public_key,
    },
    origin_encryption::{decrypt_origin_name, PrivateNameKey, PublicNameKey, NSEED},
    truncate_token_key_id, AnonOriginId, TokenInput, TokenKeyId, TokenType,
};

use super::{compute_index, public_key_to_token_key_id, Token, TokenRequest, TokenResponse, NK};

const KEYSIZE_IN_BITS: usize = 4096;

/// Issuer-side implementation of the rate-limited token protocol.
///
/// Holds the RSA token key, the HPKE name key and the per-origin index
/// scalars. Evaluation takes a read lock on the origin registry; only
/// [`IssuerServer::add_origin`] writes. A failed evaluation leaves no
/// issuer-side state behind.
#[derive(Debug)]
pub struct IssuerServer {
    key_pair: KeyPair,
    token_key_id: TokenKeyId,
    name_key: PrivateNameKey,
    origin_keys: RwLock<HashMap<String, EcSecretKey>>,
}

impl IssuerServer {
    /// Creates an issuer with a fresh 4096-bit RSA token key and a fresh
    /// name key.
    ///
    /// # Errors
    /// Returns an error if RSA key generation or name key derivation
    /// fails.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CreateKeypairError> {
        let key_pair = KeyPair::generate(rng, KEYSIZE_IN_BITS)
            .map_err(|source| CreateKeypairError::KeyGenerationFailed { source })?;
        let mut name_key_seed = [0u8; NSEED];
        rng.fill_bytes(&mut name_key_seed);
        Self::from_parts(key_pair, &name_key_seed)
    }

    /// Creates an issuer from an externally loaded RSA key pair and name
    /// key seed.
    ///
    /// # Errors
    /// Returns an error if the modulus is not 4096 bits, the name key
    /// cannot be derived, or the public key cannot be serialized.
    pub fn from_parts(
        key_pair: KeyPair,
        name_key_seed: &[u8; NSEED],
    ) -> Result<Self, CreateKeypairError> {
        if key_pair.pk.0.size() != NK {
            return Err(CreateKeypairError::InvalidKeySize);
        }
        let token_key_id = public_key_to_token_key_id(&key_pair.pk)?;
        let name_key = PrivateNameKey::from_seed(name_key_seed)?;
        Ok(Self {
            key_pair,
            token_key_id,
            name_key,
            origin_keys: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the RSA token public key.
    #[must_use]
    pub const fn token_key(&self) -> &PublicKey {
        &self.key_pair.pk
    }

    /// Returns the token key ID.
    #[must_use]
    pub const fn token_key_id(&self) -> &TokenKeyId {
        &self.token_key_id
    }

    /// Returns the public name key clients seal origin names to.
    #[must_use]
    pub const fn name_key(&self) -> &PublicNameKey {
        self.name_key.public()
    }

    /// Registers an origin, assigning it a fresh index scalar. Repeated
    /// registration keeps the existing scalar.
    pub fn add_origin<R: RngCore + CryptoRng>(&self, rng: &mut R, origin_name: &str) {
        let mut origin_keys = self.origin_keys.write().expect("origin registry poisoned");
        origin_keys
            .entry(origin_name.to_string())
            .or_insert_with(|| generate_key(rng));
    }

    /// Returns the index scalar for a registered origin, for provisioning
    /// the origin side.
    #[must_use]
    pub fn origin_index_key(&self, origin_name: &str) -> Option<EcSecretKey> {
        self.origin_keys
            .read()
            .expect("origin registry poisoned")
            .get(origin_name)
            .cloned()
    }

    /// Evaluates a token request: opens the origin name, blinds the index
    /// request with the origin's scalar, and blind-signs the token input.
    ///
    /// The error kind is for local consumption only; transports should
    /// surface every failure as one uniform rejection (see
    /// [`EvaluateError`]).
    ///
    /// # Errors
    /// Returns an error if the request is malformed, the origin name
    /// cannot be opened, or the origin is not registered.
    pub fn evaluate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        token_request: &TokenRequest,
    ) -> Result<TokenResponse, EvaluateError> {
        // Range-check the blinded message before opening the origin name,
        // so a numerically invalid request is rejected no matter what it
        // is bound to.
        let modulus = self.key_pair.pk.0.n().to_bytes_be();
        if modulus.len() != NK || token_request.blinded_msg.as_slice() >= modulus.as_slice() {
            warn!("Rejected token request with out-of-range blinded message");
            return Err(EvaluateError::MalformedRequest);
        }
        if token_request.truncated_token_key_id != truncate_token_key_id(&self.token_key_id) {
            warn!("Rejected token request for an unknown token key");
            return Err(EvaluateError::MalformedRequest);
        }

        let origin_name = decrypt_origin_name(
            &self.name_key,
            token_request.truncated_token_key_id,
            &token_request.blinded_msg,
            &token_request.request_key,
            token_request.encrypted_origin_name.as_slice(),
        )
        .inspect_err(|e| warn!(error:% = e; "Failed to open encrypted origin name"))
        .map_err(|source| EvaluateError::DecryptFailure { source })?;

        // blinded_request_key = origin_index_sk * request_key
        let blinded_request_key = {
            let origin_keys = self.origin_keys.read().expect("origin registry poisoned");
            let origin_index_key = origin_keys.get(&origin_name).ok_or_else(|| {
                warn!("Rejected token request for an unregistered origin");
                EvaluateError::UnknownOrigin
            })?;
            let request_key = deserialize_public_key(&token_request.request_key)
                .map_err(|source| EvaluateError::KeyBlindingError { source })?;
            blind_public_key(&request_key, origin_index_key)
                .map_err(|source| EvaluateError::KeyBlindingError { source })?
        };

        // blind_sig = rsabssa_blind_sign(skI, blinded_msg)
        let options = Options::default();
        let blind_sig = self
            .key_pair
            .sk
            .blind_sign(rng, token_request.blinded_msg.as_slice(), &options)
            .inspect_err(|e| warn!(error:% = e; "Failed to compute blind signature"))
            .map_err(|source| EvaluateError::BlindSignatureFailed { source })?;

        debug_assert!(blind_sig.len() == NK);
        let mut blind_sig_buf = [0u8; NK];
        blind_sig_buf.copy_from_slice(blind_sig.as_slice());

        Ok(TokenResponse {
            blind_sig: blind_sig_buf,
            blinded_request_key: serialize_ec_public_key(&blinded_request_key),
        })
    }
}

/// Origin-side verification of rate-limited tokens.
///
/// The origin holds the index scalar the issuer assigned to it and the
/// issuer's token public key.
#[derive(Debug)]
pub struct OriginServer {
    token_key: PublicKey,
    origin_index_key: EcSecretKey,
}

impl OriginServer {
    /// Creates an origin server.
    #[must_use]
    pub const fn new(token_key: PublicKey, origin_index_key: EcSecretKey) -> Self {
        Self {
            token_key,
            origin_index_key,
        }
    }

    /// Computes the anonymous origin ID for a client public key, the same
    /// value the client derives during finalization.
    ///
    /// # Errors
    /// Returns an error if the index key derivation fails.
    pub fn compute_anon_origin_id(
        &self,
        client_key: &EcPublicKey,
    ) -> Result<AnonOriginId, KeyBlindingError> {
        let index_key = blind_public_key(client_key, &self.origin_index_key)?;
        Ok(compute_index(
            &serialize_ec_public_key(client_key),
            &serialize_ec_public_key(&index_key),
        ))
    }

    /// Verifies a presented token and its anonymous origin ID.
    ///
    /// # Errors
    /// Returns an error if the token type is wrong, the authenticator does
    /// not verify under the issuer key, or the anonymous origin ID does
    /// not match the client public key.
    pub fn redeem_token(
        &self,
        token: &Token,
        anon_origin_id: &AnonOriginId,
        client_key: &EcPublicKey,
    ) -> Result<(), RedeemTokenError> {
        if token.token_type() != TokenType::RateLimited {
            return Err(RedeemTokenError::TokenTypeMismatch {
                expected: TokenType::RateLimited,
                found: token.token_type(),
            });
        }

        let token_input = TokenInput::new(
            token.token_type(),
            token.nonce(),
            *token.challenge_digest(),
            *token.token_key_id(),
        );
        let options = Options::default();
        let signature = Signature(token.authenticator().to_vec());
        signature
            .verify(&self.token_key, None, token_input.serialize(), &options)
            .map_err(|_| RedeemTokenError::InvalidSignature {
                token_type: TokenType::RateLimited,
            })?;

        let expected = self
            .compute_anon_origin_id(client_key)
            .map_err(|source| RedeemTokenError::KeyBlindingError { source })?;
        if &expected != anon_origin_id {
            return Err(RedeemTokenError::AnonOriginIdMismatch);
        }
        Ok(())
    }
}
