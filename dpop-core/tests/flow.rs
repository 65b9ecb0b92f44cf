use chrono::Utc;
use dpop_core::jws::decode_compact;
use dpop_core::verify::{DpopPolicy, ExpectedRequest, verify_proof};
use dpop_core::{
    Algorithm, JwsSealer, KeyPair, KeySession, ProofRequest, TokenGrant,
    assemble_demo_access_token, build_dpop_proof, compute_jwk_thumbprint, generate_key_pair,
};

const API_URL: &str = "https://api.example.com/profile";
const ACCESS_TOKEN: &str = "abc.def.ghi";

fn is_b64url(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[tokio::test]
async fn es256_profile_request_scenario() {
    let key_pair = generate_key_pair(Algorithm::ES256).await.unwrap();
    let thumbprint = compute_jwk_thumbprint(key_pair.public_jwk().as_ref()).unwrap();
    assert_eq!(thumbprint, key_pair.thumbprint());

    let proof = build_dpop_proof(
        Algorithm::ES256,
        &key_pair,
        ProofRequest::new("GET", API_URL, Utc::now()).with_access_token(ACCESS_TOKEN),
    )
    .unwrap();

    let segments: Vec<&str> = proof.split('.').collect();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| is_b64url(s)));

    let decoded = decode_compact(&proof).unwrap();
    assert_eq!(decoded.header_str("typ"), Some("dpop+jwt"));
    assert_eq!(decoded.header_str("alg"), Some("ES256"));
    assert_eq!(decoded.header["jwk"]["crv"], "P-256");
    assert_eq!(decoded.payload_str("htm"), Some("GET"));
    assert_eq!(decoded.payload_str("htu"), Some(API_URL));
    assert_eq!(
        decoded.payload_str("ath"),
        Some("ZVnpC13VdAW98YDym1CQU6PTbEq_PeU1qySbVNQycjQ")
    );
}

#[tokio::test]
async fn token_bound_to_session_key_passes_resource_server_checks() {
    let session = KeySession::new();
    session.regenerate(Algorithm::PS384).await.unwrap();
    let client_key = session.current().await.unwrap();

    let issuer_key = KeyPair::generate(Algorithm::RS256).unwrap();
    let grant = TokenGrant {
        issuer: "https://auth.example.com".into(),
        subject: "user@example.com".into(),
        audience: "https://api.example.com".into(),
        scope: "read write".into(),
        client_id: Some("myapp-client-id".into()),
        issued_at: Utc::now(),
        lifetime: chrono::Duration::seconds(3600),
    };
    let access_token =
        assemble_demo_access_token(&grant, client_key.thumbprint(), &JwsSealer::new(issuer_key.clone()))
            .unwrap();

    let (_, claims) = dpop_core::access_token::verify_access_token(
        &access_token,
        issuer_key.public_jwk().as_ref(),
        Algorithm::RS256,
    )
    .unwrap();

    let now = Utc::now();
    let proof = build_dpop_proof(
        client_key.algorithm(),
        &client_key,
        ProofRequest::new("GET", API_URL, now).with_access_token(&access_token),
    )
    .unwrap();

    let verified = verify_proof(
        DpopPolicy {
            require_ath: true,
            ..DpopPolicy::default()
        },
        &proof,
        ExpectedRequest {
            method: "GET",
            htu: API_URL,
            access_token: Some(&access_token),
            expected_jkt: Some(&claims.cnf.jkt),
        },
        now,
    )
    .unwrap();
    assert_eq!(verified.algorithm, Algorithm::PS384);
    assert_eq!(verified.jkt, client_key.thumbprint());
}

#[test]
fn every_algorithm_produces_a_verifiable_proof() {
    for alg in Algorithm::ALL {
        let key_pair = KeyPair::generate(alg).unwrap();
        let proof = build_dpop_proof(
            alg,
            &key_pair,
            ProofRequest::new("POST", "https://as.example.com/token", Utc::now()),
        )
        .unwrap();
        let decoded = decode_compact(&proof).unwrap();
        assert_eq!(decoded.header_str("alg"), Some(alg.as_str()));

        let jwk = decoded.header["jwk"].as_object().unwrap();
        dpop_core::verify_compact_jws(&proof, jwk, alg).unwrap();
    }
}
