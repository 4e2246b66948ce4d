use std::sync::OnceLock;

use blind_rsa_signatures::reexports::rsa::PublicKeyParts;
use blind_rsa_signatures::KeyPair;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use privacypass_rate_limited::{
    common::errors::{EvaluateError, RedeemTokenError},
    key_blinding::{blind_public_key, create_key, serialize_public_key},
    rate_limited_tokens::{
        client::Client,
        compute_index,
        server::{IssuerServer, OriginServer},
        Token, TokenRequest, TokenResponse, NE, NK,
    },
    Deserialize, Serialize, TokenType,
};

const TEST_ORIGIN: &str = "origin.example";

// 4096-bit RSA key generation dominates the test runtime, so all tests
// share one token key.
fn test_key_pair() -> KeyPair {
    static KEY_PAIR: OnceLock<KeyPair> = OnceLock::new();
    KEY_PAIR
        .get_or_init(|| KeyPair::generate(&mut OsRng, 4096).unwrap())
        .clone()
}

fn test_issuer() -> IssuerServer {
    IssuerServer::from_parts(test_key_pair(), &[7u8; 32]).unwrap()
}

fn test_client(issuer: &IssuerServer) -> Client {
    Client::new(
        &mut OsRng,
        issuer.token_key().clone(),
        issuer.name_key().clone(),
    )
    .unwrap()
}

fn random_blind() -> [u8; 48] {
    let mut blind = [0u8; 48];
    OsRng.fill_bytes(&mut blind);
    blind
}

#[test]
fn rate_limited_tokens_cycle() {
    // Issuer: Register the origin
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    // Client: Create client
    let client = test_client(&issuer);

    let challenge = [0x00u8; 32];
    let nonce = [0x11u8; 32];

    // Client: Prepare a TokenRequest
    let (token_request, token_state) = client
        .issue_token_request(&mut OsRng, &challenge, nonce, &random_blind(), TEST_ORIGIN)
        .unwrap();

    // Issuer: Issue a TokenResponse
    let token_response = issuer.evaluate(&mut OsRng, &token_request).unwrap();

    // Client: Turn the TokenResponse into a Token
    let (token, anon_origin_id) = client.issue_token(token_response, &token_state).unwrap();

    assert_eq!(token.token_type(), TokenType::RateLimited);
    assert_eq!(token.nonce(), nonce);
    let challenge_digest: [u8; 32] = Sha256::digest(challenge).into();
    assert_eq!(token.challenge_digest(), &challenge_digest);
    assert_eq!(token.token_key_id(), issuer.token_key_id());
    assert_eq!(token.authenticator().len(), NK);

    // Origin: Derive the same anonymous origin ID and redeem the token
    let origin = OriginServer::new(
        issuer.token_key().clone(),
        issuer.origin_index_key(TEST_ORIGIN).unwrap(),
    );
    assert_eq!(
        origin.compute_anon_origin_id(&client.public_key()).unwrap(),
        anon_origin_id
    );
    origin
        .redeem_token(&token, &anon_origin_id, &client.public_key())
        .unwrap();
}

#[test]
fn anon_origin_id_is_stable_across_blinds() {
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    let client = test_client(&issuer);

    let mut anon_origin_ids = Vec::new();
    for _ in 0..2 {
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);

        let (token_request, token_state) = client
            .issue_token_request(&mut OsRng, b"challenge", nonce, &random_blind(), TEST_ORIGIN)
            .unwrap();
        let token_response = issuer.evaluate(&mut OsRng, &token_request).unwrap();
        let (_, anon_origin_id) = client.issue_token(token_response, &token_state).unwrap();
        anon_origin_ids.push(anon_origin_id);
    }

    assert_eq!(anon_origin_ids[0], anon_origin_ids[1]);
}

#[test]
fn anon_origin_ids_are_unlinkable_across_origins() {
    // Pinned keys keep the bit distance deterministic.
    let client_key = create_key(
        &hex::decode("0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f202122232425262728292a2b2c2d2e2f30")
            .unwrap(),
    )
    .unwrap();
    let origin_a = create_key(
        &hex::decode("d1935a9829fb7729e68de7f70a969bb78f7333026f1968ce244101d88403dd8bf26b2812550f942102889767404b4cc7")
            .unwrap(),
    )
    .unwrap();
    let origin_b = create_key(
        &hex::decode("11ffaab58e70de043143a701c79da31621b4a2ea501962aebec21871426edddb55d69a253e71d5edb4118fab23a1e865")
            .unwrap(),
    )
    .unwrap();

    let client_key_enc = serialize_public_key(&client_key.public_key());
    let id_a = compute_index(
        &client_key_enc,
        &serialize_public_key(&blind_public_key(&client_key.public_key(), &origin_a).unwrap()),
    );
    let id_b = compute_index(
        &client_key_enc,
        &serialize_public_key(&blind_public_key(&client_key.public_key(), &origin_b).unwrap()),
    );

    let differing_bits: u32 = id_a
        .iter()
        .zip(id_b.iter())
        .map(|(a, b)| (a ^ b).count_ones())
        .sum();
    assert!(
        differing_bits >= 120,
        "anonymous origin IDs differ in only {differing_bits} bits"
    );
}

#[test]
fn tampered_blinded_msg_fails_decryption() {
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    let client = test_client(&issuer);
    let (token_request, _token_state) = client
        .issue_token_request(&mut OsRng, b"challenge", [0u8; 32], &random_blind(), TEST_ORIGIN)
        .unwrap();

    // Flip the low bit of the last blinded_msg byte; the HPKE info string
    // no longer matches the one the client sealed under.
    let mut wire = token_request.tls_serialize_detached().unwrap();
    wire[NK] ^= 1;
    let tampered = TokenRequest::try_from_bytes(&wire).unwrap();

    assert!(matches!(
        issuer.evaluate(&mut OsRng, &tampered),
        Err(EvaluateError::DecryptFailure { .. })
    ));
}

#[test]
fn out_of_range_blinded_msg_is_malformed() {
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    // blinded_msg = N, the RSA modulus itself.
    let modulus = issuer.token_key().0.n().to_bytes_be();
    assert_eq!(modulus.len(), NK);

    let mut wire = Vec::new();
    wire.push(issuer.token_key_id()[0]);
    wire.extend_from_slice(&modulus);
    wire.extend_from_slice(&[0u8; NE]);
    wire.extend_from_slice(&0u16.to_be_bytes());
    let token_request = TokenRequest::try_from_bytes(&wire).unwrap();

    assert!(matches!(
        issuer.evaluate(&mut OsRng, &token_request),
        Err(EvaluateError::MalformedRequest)
    ));
}

#[test]
fn unknown_origin_is_rejected() {
    // Issuer with an empty origin registry.
    let issuer = test_issuer();

    let client = test_client(&issuer);
    let (token_request, _token_state) = client
        .issue_token_request(&mut OsRng, b"challenge", [0u8; 32], &random_blind(), TEST_ORIGIN)
        .unwrap();

    assert!(matches!(
        issuer.evaluate(&mut OsRng, &token_request),
        Err(EvaluateError::UnknownOrigin)
    ));
}

#[test]
fn redeeming_a_tampered_token_fails() {
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    let client = test_client(&issuer);
    let (token_request, token_state) = client
        .issue_token_request(&mut OsRng, b"challenge", [0u8; 32], &random_blind(), TEST_ORIGIN)
        .unwrap();
    let token_response = issuer.evaluate(&mut OsRng, &token_request).unwrap();
    let (token, anon_origin_id) = client.issue_token(token_response, &token_state).unwrap();

    let origin = OriginServer::new(
        issuer.token_key().clone(),
        issuer.origin_index_key(TEST_ORIGIN).unwrap(),
    );

    // Flip a bit in the authenticator.
    let mut wire = token.tls_serialize_detached().unwrap();
    let authenticator_offset = wire.len() - NK;
    wire[authenticator_offset] ^= 1;
    let tampered = Token::try_from_bytes(&wire).unwrap();

    assert_eq!(
        origin.redeem_token(&tampered, &anon_origin_id, &client.public_key()),
        Err(RedeemTokenError::InvalidSignature {
            token_type: TokenType::RateLimited
        })
    );

    // A wrong anonymous origin ID is rejected as well.
    let mut wrong_id = anon_origin_id;
    wrong_id[0] ^= 1;
    assert_eq!(
        origin.redeem_token(&token, &wrong_id, &client.public_key()),
        Err(RedeemTokenError::AnonOriginIdMismatch)
    );
}

#[test]
fn wire_formats_round_trip() {
    let issuer = test_issuer();
    issuer.add_origin(&mut OsRng, TEST_ORIGIN);

    let client = test_client(&issuer);
    let (token_request, token_state) = client
        .issue_token_request(&mut OsRng, b"challenge", [0x11u8; 32], &random_blind(), TEST_ORIGIN)
        .unwrap();

    let request_wire = token_request.tls_serialize_detached().unwrap();
    let encrypted_origin_name_len = TEST_ORIGIN.len() + 32 + 16;
    assert_eq!(request_wire.len(), 1 + NK + NE + 2 + encrypted_origin_name_len);
    assert_eq!(
        TokenRequest::tls_deserialize(&mut request_wire.as_slice()).unwrap(),
        token_request
    );

    let token_response = issuer.evaluate(&mut OsRng, &token_request).unwrap();
    let response_wire = token_response.tls_serialize_detached().unwrap();
    assert_eq!(response_wire.len(), NK + NE);
    assert_eq!(
        TokenResponse::try_from_bytes(&response_wire).unwrap(),
        token_response
    );

    let (token, _) = client.issue_token(token_response, &token_state).unwrap();
    let token_wire = token.tls_serialize_detached().unwrap();
    assert_eq!(token_wire.len(), 2 + 32 + 32 + 32 + NK);
    assert_eq!(&token_wire[..2], &[0x00, 0x03]);
    assert_eq!(Token::try_from_bytes(&token_wire).unwrap(), token);
}
