//! Client-side implementation of the rate-limited token protocol.

use blind_rsa_signatures::{BlindSignature, BlindingResult, Options, PublicKey};
use log::warn;
use p384::{PublicKey as EcPublicKey, SecretKey as EcSecretKey};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{
    common::errors::{CreateKeypairError, IssueTokenError, IssueTokenRequestError},
    key_blinding::{
        blind_public_key, create_key, deserialize_public_key, generate_key,
        serialize_public_key as serialize_ec_public_key, unblind_public_key,
    },
    origin_encryption::{encrypt_origin_name, PublicNameKey},
    truncate_token_key_id, AnonOriginId, ChallengeDigest, Nonce, TokenInput, TokenKeyId, TokenType,
};

use super::{compute_index, public_key_to_token_key_id, Token, TokenRequest, TokenResponse, NE, NK};

/// State that is kept between the token request and the token response.
///
/// The RSA blinding secret is wiped on drop; the request blind lives in a
/// [`p384::SecretKey`], which zeroizes itself.
#[derive(Debug)]
pub struct TokenState {
    token_input: TokenInput,
    challenge_digest: ChallengeDigest,
    blinding_result: BlindingResult,
    request_blind: EcSecretKey,
    client_key_enc: [u8; NE],
}

impl Drop for TokenState {
    fn drop(&mut self) {
        self.blinding_result.secret.0.zeroize();
    }
}

/// Client-side implementation of the rate-limited token protocol.
///
/// Holds the long-term client EC key and the issuer's token and name
/// keys. One client instance can run any number of issuances.
#[derive(Debug)]
pub struct Client {
    secret_key: EcSecretKey,
    public_key: PublicKey,
    token_key_id: TokenKeyId,
    name_key: PublicNameKey,
}

impl Client {
    /// Creates a client with a fresh long-term key.
    ///
    /// # Errors
    /// Returns an error if the issuer public key cannot be serialized.
    pub fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        public_key: PublicKey,
        name_key: PublicNameKey,
    ) -> Result<Self, CreateKeypairError> {
        let secret_key = generate_key(rng);
        Self::from_parts(secret_key, public_key, name_key)
    }

    /// Recovers a client from long-term secret key bytes.
    ///
    /// # Errors
    /// Returns an error if the scalar bytes are invalid or the issuer
    /// public key cannot be serialized.
    pub fn from_secret(
        secret: &[u8],
        public_key: PublicKey,
        name_key: PublicNameKey,
    ) -> Result<Self, CreateKeypairError> {
        let secret_key =
            create_key(secret).map_err(|source| CreateKeypairError::InvalidClientKey { source })?;
        Self::from_parts(secret_key, public_key, name_key)
    }

    fn from_parts(
        secret_key: EcSecretKey,
        public_key: PublicKey,
        name_key: PublicNameKey,
    ) -> Result<Self, CreateKeypairError> {
        let token_key_id = public_key_to_token_key_id(&public_key)?;
        Ok(Self {
            secret_key,
            public_key,
            token_key_id,
            name_key,
        })
    }

    /// Returns the client's long-term public key.
    #[must_use]
    pub fn public_key(&self) -> EcPublicKey {
        self.secret_key.public_key()
    }

    /// Issue a new token request.
    ///
    /// The request binds the blinded token input, the index request and
    /// the encrypted origin name together; the returned state is consumed
    /// by [`Client::issue_token`].
    ///
    /// # Errors
    /// Returns an error if the blind scalar is invalid, the token input
    /// cannot be blinded, or the origin name cannot be sealed.
    pub fn issue_token_request<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        challenge: &[u8],
        nonce: Nonce,
        blind_scalar: &[u8],
        origin_name: &str,
    ) -> Result<(TokenRequest, TokenState), IssueTokenRequestError> {
        // request_key = request_blind * pkC
        let request_blind = create_key(blind_scalar)
            .map_err(|source| IssueTokenRequestError::KeyBlindingError { source })?;
        let client_public_key = self.secret_key.public_key();
        let request_key = blind_public_key(&client_public_key, &request_blind)
            .map_err(|source| IssueTokenRequestError::KeyBlindingError { source })?;
        let request_key_enc = serialize_ec_public_key(&request_key);

        // challenge_digest = SHA256(challenge)
        // token_input = concat(0x0003, nonce, challenge_digest, token_key_id)
        // blinded_msg, blind_inv = rsabssa_blind(pkI, token_input)
        let challenge_digest: ChallengeDigest = Sha256::digest(challenge).into();
        let token_input = TokenInput::new(
            TokenType::RateLimited,
            nonce,
            challenge_digest,
            self.token_key_id,
        );

        let options = Options::default();
        let blinding_result = self
            .public_key
            .blind(rng, token_input.serialize(), false, &options)
            .inspect_err(|e| warn!(error:% = e; "Failed to blind token input"))
            .map_err(|source| IssueTokenRequestError::BlindingError { source })?;

        debug_assert!(blinding_result.blind_msg.len() == NK);
        let mut blinded_msg = [0u8; NK];
        blinded_msg.copy_from_slice(blinding_result.blind_msg.as_slice());

        let truncated_token_key_id = truncate_token_key_id(&self.token_key_id);
        let encrypted_origin_name = encrypt_origin_name(
            &self.name_key,
            truncated_token_key_id,
            &blinded_msg,
            &request_key_enc,
            origin_name,
        )
        .inspect_err(|e| warn!(error:% = e; "Failed to seal origin name"))
        .map_err(|source| IssueTokenRequestError::OriginEncryptionError { source })?;

        let token_request = TokenRequest {
            truncated_token_key_id,
            blinded_msg,
            request_key: request_key_enc,
            encrypted_origin_name: encrypted_origin_name.into(),
        };

        let token_state = TokenState {
            token_input,
            challenge_digest,
            blinding_result,
            request_blind,
            client_key_enc: serialize_ec_public_key(&client_public_key),
        };
        Ok((token_request, token_state))
    }

    /// Issue a token and its anonymous origin ID.
    ///
    /// # Errors
    /// Returns an error if the unblinded signature does not verify or the
    /// blinded request key is not a valid curve point.
    pub fn issue_token(
        &self,
        token_response: TokenResponse,
        token_state: &TokenState,
    ) -> Result<(Token, AnonOriginId), IssueTokenError> {
        // authenticator = rsabssa_finalize(pkI, blind_sig, blind_inv)
        let token_input = token_state.token_input.serialize();
        let options = Options::default();
        let blind_sig = BlindSignature(token_response.blind_sig.to_vec());
        let signature = self
            .public_key
            .finalize(
                &blind_sig,
                &token_state.blinding_result.secret,
                None,
                token_input,
                &options,
            )
            .inspect_err(|e| warn!(error:% = e; "Failed to finalize blind signature"))
            .map_err(|source| IssueTokenError::InvalidSignature { source })?;
        let mut authenticator = [0u8; NK];
        authenticator.copy_from_slice(&signature[..NK]);

        // index_key = request_blind⁻¹ * blinded_request_key
        let blinded_request_key = deserialize_public_key(&token_response.blinded_request_key)
            .map_err(|source| IssueTokenError::KeyBlindingError { source })?;
        let index_key = unblind_public_key(&blinded_request_key, &token_state.request_blind)
            .map_err(|source| IssueTokenError::KeyBlindingError { source })?;
        let anon_origin_id = compute_index(
            &token_state.client_key_enc,
            &serialize_ec_public_key(&index_key),
        );

        let token = Token::new(
            TokenType::RateLimited,
            token_state.token_input.nonce,
            token_state.challenge_digest,
            token_state.token_input.token_key_id,
            authenticator,
        );
        Ok((token, anon_origin_id))
    }
}
