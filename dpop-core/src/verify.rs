//! DPoP proof validation (RFC 9449 section 4.3), as a server would do it.
//!
//! Core logic only: no HTTP framework types and no storage. Callers pass the
//! request they received as an [`ExpectedRequest`] and run replay protection
//! on the returned `jti` afterwards.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::algorithm::Algorithm;
use crate::error::VerifyError;
use crate::jwk::{compute_jwk_thumbprint, has_private_members};
use crate::jws::{decode_compact, verify_compact_jws};
use crate::proof::{DPOP_JWT_TYPE, access_token_hash};

/// Policy knobs for [`verify_proof`].
#[derive(Debug, Clone, Copy)]
pub struct DpopPolicy {
    // Allowed iat drift (clock skew), seconds.
    pub iat_leeway_seconds: i64,
    // Maximum acceptable age of the proof (now - iat), seconds.
    pub max_age_seconds: i64,
    // If true, the proof must carry `ath` matching the access token.
    pub require_ath: bool,
    pub replay_ttl_seconds: u64,
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            iat_leeway_seconds: 60,
            max_age_seconds: 300,
            require_ath: false,
            replay_ttl_seconds: 300,
        }
    }
}

impl DpopPolicy {
    /// How long a verified proof's `jti` has to stay in the replay store.
    ///
    /// Never shorter than the window in which [`verify_proof`] still accepts
    /// a proof with this `iat`, so an expired entry cannot let it back in.
    pub fn replay_ttl_for(&self, iat: i64, now: DateTime<Utc>) -> u64 {
        let accepted_until = iat + self.max_age_seconds + self.iat_leeway_seconds;
        let remaining = u64::try_from(accepted_until - now.timestamp() + 1).unwrap_or(0);
        remaining.max(self.replay_ttl_seconds)
    }
}

/// The request the proof is supposed to accompany.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedRequest<'a> {
    pub method: &'a str,
    /// Absolute URI of the request as the server sees it.
    pub htu: &'a str,
    pub access_token: Option<&'a str>,
    /// `cnf.jkt` of the presented access token, if any.
    pub expected_jkt: Option<&'a str>,
}

/// Verified DPoP proof information useful for downstream checks.
#[derive(Debug, Clone)]
pub struct VerifiedDpop {
    pub jti: String,
    pub iat: i64,
    pub htm: String,
    pub htu: String,
    pub nonce: Option<String>,
    /// Thumbprint of the proof's key; what a token endpoint binds to.
    pub jkt: String,
    pub algorithm: Algorithm,
}

#[derive(Debug, thiserror::Error)]
pub enum DpopVerifyError {
    #[error("invalid DPoP proof jwt")]
    InvalidJwt,
    #[error("invalid DPoP typ")]
    InvalidTyp,
    #[error("unsupported DPoP alg: {0:?}")]
    UnsupportedAlg(String),
    #[error("missing jwk in DPoP header")]
    MissingJwk,
    #[error("DPoP jwk contains private key material")]
    PrivateJwk,
    #[error("unsupported jwk for DPoP")]
    UnsupportedJwk,
    #[error("DPoP proof signature verification failed")]
    BadSignature,
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("htm mismatch")]
    MethodMismatch,
    #[error("htu mismatch")]
    UriMismatch,
    #[error("iat out of range")]
    InvalidIat,
    #[error("ath mismatch")]
    AthMismatch,
    #[error("cnf.jkt mismatch")]
    JktMismatch,
}

#[derive(Debug, Deserialize)]
struct ProofClaims {
    htm: Option<String>,
    htu: Option<String>,
    iat: Option<i64>,
    jti: Option<String>,
    ath: Option<String>,
    nonce: Option<String>,
}

/// Verify a DPoP proof's signature and claims against the received request.
pub fn verify_proof(
    policy: DpopPolicy,
    proof: &str,
    expected: ExpectedRequest<'_>,
    now: DateTime<Utc>,
) -> Result<VerifiedDpop, DpopVerifyError> {
    // 1) Header: typ, alg, jwk.
    let decoded = decode_compact(proof).map_err(|e| {
        warn!(error = %e, "malformed DPoP proof");
        DpopVerifyError::InvalidJwt
    })?;

    match decoded.header_str("typ") {
        Some(typ) if typ.eq_ignore_ascii_case(DPOP_JWT_TYPE) => {}
        _ => return Err(DpopVerifyError::InvalidTyp),
    }

    let alg_name = decoded.header_str("alg").unwrap_or_default();
    let algorithm: Algorithm = alg_name
        .parse()
        .map_err(|_| DpopVerifyError::UnsupportedAlg(alg_name.to_string()))?;

    let jwk: &Map<String, Value> = decoded
        .header
        .get("jwk")
        .and_then(Value::as_object)
        .ok_or(DpopVerifyError::MissingJwk)?;
    if has_private_members(jwk) {
        return Err(DpopVerifyError::PrivateJwk);
    }
    let jkt = compute_jwk_thumbprint(jwk).map_err(|_| DpopVerifyError::UnsupportedJwk)?;

    // sender-constrained: cnf.jkt vs DPoP jwk thumbprint
    if let Some(expected_jkt) = expected.expected_jkt {
        if jkt != expected_jkt {
            return Err(DpopVerifyError::JktMismatch);
        }
    }

    // 2) Signature with the embedded key.
    verify_compact_jws(proof, jwk, algorithm).map_err(|e| match e {
        VerifyError::BadSignature => DpopVerifyError::BadSignature,
        VerifyError::Thumbprint(_) | VerifyError::Key { .. } | VerifyError::KeyMismatch { .. } => {
            DpopVerifyError::UnsupportedJwk
        }
        other => {
            warn!(error = %other, "invalid DPoP proof");
            DpopVerifyError::InvalidJwt
        }
    })?;

    // 3) Required claims.
    let claims: ProofClaims = serde_json::from_value(Value::Object(decoded.payload))
        .map_err(|_| DpopVerifyError::InvalidJwt)?;
    let htm = claims.htm.ok_or(DpopVerifyError::MissingClaim("htm"))?;
    let htu = claims.htu.ok_or(DpopVerifyError::MissingClaim("htu"))?;
    let iat = claims.iat.ok_or(DpopVerifyError::MissingClaim("iat"))?;
    let jti = claims.jti.ok_or(DpopVerifyError::MissingClaim("jti"))?;
    if jti.is_empty() {
        return Err(DpopVerifyError::MissingClaim("jti"));
    }

    // 4) htm
    if !htm.eq_ignore_ascii_case(expected.method) {
        return Err(DpopVerifyError::MethodMismatch);
    }

    // 5) htu, compared without query and fragment
    match (normalize_htu(&htu), normalize_htu(expected.htu)) {
        (Some(got), Some(want)) if got == want => {}
        _ => return Err(DpopVerifyError::UriMismatch),
    }

    // 6) iat window
    let now = now.timestamp();
    let leeway = policy.iat_leeway_seconds;
    if iat > now + leeway {
        return Err(DpopVerifyError::InvalidIat);
    }
    if now - iat > policy.max_age_seconds + leeway {
        return Err(DpopVerifyError::InvalidIat);
    }

    // 7) ath
    if policy.require_ath {
        let access = expected
            .access_token
            .ok_or(DpopVerifyError::MissingClaim("ath"))?;
        let ath = claims.ath.ok_or(DpopVerifyError::MissingClaim("ath"))?;
        if ath != access_token_hash(access) {
            return Err(DpopVerifyError::AthMismatch);
        }
    }

    Ok(VerifiedDpop {
        jti,
        iat,
        htm,
        htu,
        nonce: claims.nonce,
        jkt,
        algorithm,
    })
}

/// Absolute request URI from a configured public base URL and a request path.
pub fn build_htu_from_base(base: &str, path_and_query: &str) -> Result<String, url::ParseError> {
    let base = url::Url::parse(base)?;
    Ok(base.join(path_and_query)?.to_string())
}

// Lowercase scheme and host, drop default ports, drop query and fragment.
fn normalize_htu(htu: &str) -> Option<String> {
    let url = url::Url::parse(htu).ok()?;
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str()?.to_ascii_lowercase();
    let mut out = format!("{scheme}://{host}");
    // `port()` is already None for the scheme's default port.
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jws::{b64url, sign_compact_jws, signer_for};
    use crate::keys::KeyPair;
    use crate::proof::{ProofRequest, build_dpop_proof};
    use crate::replay::MemoryReplayStore;
    use chrono::Duration;
    use serde_json::json;

    const URL: &str = "https://api.example.com/profile";
    const TOKEN: &str = "abc.def.ghi";

    fn policy() -> DpopPolicy {
        DpopPolicy {
            require_ath: true,
            ..DpopPolicy::default()
        }
    }

    fn expected<'a>(jkt: Option<&'a str>) -> ExpectedRequest<'a> {
        ExpectedRequest {
            method: "GET",
            htu: URL,
            access_token: Some(TOKEN),
            expected_jkt: jkt,
        }
    }

    fn proof(key_pair: &KeyPair, now: DateTime<Utc>) -> String {
        build_dpop_proof(
            key_pair.algorithm(),
            key_pair,
            ProofRequest::new("GET", URL, now).with_access_token(TOKEN),
        )
        .unwrap()
    }

    #[test]
    fn accepts_a_well_formed_bound_proof() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let verified = verify_proof(
            policy(),
            &proof(&key_pair, now),
            expected(Some(key_pair.thumbprint())),
            now,
        )
        .unwrap();

        assert_eq!(verified.htm, "GET");
        assert_eq!(verified.jkt, key_pair.thumbprint());
        assert_eq!(verified.algorithm, Algorithm::ES256);
        assert_eq!(verified.iat, now.timestamp());
    }

    #[test]
    fn rejects_proof_from_another_key() {
        let bound = KeyPair::generate(Algorithm::ES256).unwrap();
        let attacker = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let err = verify_proof(
            policy(),
            &proof(&attacker, now),
            expected(Some(bound.thumbprint())),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, DpopVerifyError::JktMismatch));
    }

    #[test]
    fn rejects_wrong_method_and_uri() {
        let key_pair = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let now = Utc::now();
        let token = proof(&key_pair, now);

        let post = ExpectedRequest { method: "POST", ..expected(None) };
        assert!(matches!(
            verify_proof(policy(), &token, post, now),
            Err(DpopVerifyError::MethodMismatch)
        ));

        let other = ExpectedRequest { htu: "https://api.example.com/admin", ..expected(None) };
        assert!(matches!(
            verify_proof(policy(), &token, other, now),
            Err(DpopVerifyError::UriMismatch)
        ));
    }

    #[test]
    fn htu_comparison_ignores_query_and_default_port() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let token = proof(&key_pair, now);
        let received = ExpectedRequest {
            htu: "https://API.example.com:443/profile?fields=email",
            ..expected(None)
        };
        assert!(verify_proof(policy(), &token, received, now).is_ok());
    }

    #[test]
    fn enforces_iat_window() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();

        let stale = proof(&key_pair, now - Duration::seconds(361));
        assert!(matches!(
            verify_proof(policy(), &stale, expected(None), now),
            Err(DpopVerifyError::InvalidIat)
        ));

        let future = proof(&key_pair, now + Duration::seconds(61));
        assert!(matches!(
            verify_proof(policy(), &future, expected(None), now),
            Err(DpopVerifyError::InvalidIat)
        ));

        let skewed = proof(&key_pair, now + Duration::seconds(30));
        assert!(verify_proof(policy(), &skewed, expected(None), now).is_ok());
    }

    #[test]
    fn ath_must_match_presented_token() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let token = proof(&key_pair, now);
        let swapped = ExpectedRequest { access_token: Some("other.token.value"), ..expected(None) };
        assert!(matches!(
            verify_proof(policy(), &token, swapped, now),
            Err(DpopVerifyError::AthMismatch)
        ));

        let unbound = build_dpop_proof(
            Algorithm::ES256,
            &key_pair,
            ProofRequest::new("GET", URL, now),
        )
        .unwrap();
        assert!(matches!(
            verify_proof(policy(), &unbound, expected(None), now),
            Err(DpopVerifyError::MissingClaim("ath"))
        ));
        let lenient = DpopPolicy { require_ath: false, ..policy() };
        assert!(verify_proof(lenient, &unbound, expected(None), now).is_ok());
    }

    #[test]
    fn rejects_wrong_typ_and_tampering() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let header = json!({
            "typ": "JWT",
            "alg": "ES256",
            "jwk": key_pair.canonical_public_jwk().to_map(),
        });
        let claims = json!({"jti": "x", "htm": "GET", "htu": URL, "iat": now.timestamp()});
        let jwt = sign_compact_jws(&header, &claims, key_pair.private_key(), Algorithm::ES256).unwrap();
        assert!(matches!(
            verify_proof(policy(), &jwt, expected(None), now),
            Err(DpopVerifyError::InvalidTyp)
        ));

        let good = proof(&key_pair, now);
        let mut parts: Vec<String> = good.split('.').map(str::to_string).collect();
        parts[1] = b64url(
            json!({"jti": "y", "htm": "GET", "htu": URL, "iat": now.timestamp()})
                .to_string()
                .as_bytes(),
        );
        assert!(matches!(
            verify_proof(policy(), &parts.join("."), expected(None), now),
            Err(DpopVerifyError::BadSignature)
        ));
    }

    #[test]
    fn rejects_edwards_key_presented_under_the_other_curve() {
        let ed448 = KeyPair::generate(Algorithm::Ed448).unwrap();
        let now = Utc::now();
        let header = json!({
            "typ": "dpop+jwt",
            "alg": "Ed25519",
            "jwk": ed448.canonical_public_jwk().to_map(),
        });
        let claims = json!({"jti": "x", "htm": "GET", "htu": URL, "iat": now.timestamp()});
        let signing_input = format!(
            "{}.{}",
            b64url(header.to_string().as_bytes()),
            b64url(claims.to_string().as_bytes()),
        );
        let signer = signer_for(Algorithm::Ed448, ed448.private_key().jwk()).unwrap();
        let signature = signer.sign(signing_input.as_bytes()).unwrap();
        let jwt = format!("{signing_input}.{}", b64url(&signature));

        let lenient = DpopPolicy { require_ath: false, ..policy() };
        assert!(matches!(
            verify_proof(lenient, &jwt, expected(None), now),
            Err(DpopVerifyError::UnsupportedJwk)
        ));
    }

    async fn accept_once(
        store: &MemoryReplayStore,
        token: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let verified = verify_proof(policy(), token, expected(None), at).unwrap();
        let ttl = policy().replay_ttl_for(verified.iat, at);
        store.check_and_store_at(&verified.jti, ttl, at).await.unwrap()
    }

    #[tokio::test]
    async fn replay_entry_lasts_as_long_as_the_proof_is_accepted() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let store = MemoryReplayStore::new();
        let t0 = Utc::now();

        let token = proof(&key_pair, t0);
        assert!(accept_once(&store, &token, t0).await);
        for later in [300, 330, 359] {
            assert!(!accept_once(&store, &token, t0 + Duration::seconds(later)).await);
        }

        // iat skewed into the future stretches the window past max_age.
        let skewed = proof(&key_pair, t0 + Duration::seconds(60));
        assert!(accept_once(&store, &skewed, t0).await);
        assert!(!accept_once(&store, &skewed, t0 + Duration::seconds(419)).await);
    }

    #[test]
    fn replay_ttl_never_drops_below_the_configured_floor() {
        let now = Utc::now();
        let policy = policy();
        assert_eq!(policy.replay_ttl_for(now.timestamp(), now), 361);
        assert_eq!(policy.replay_ttl_for(now.timestamp() - 1000, now), 300);
    }

    #[test]
    fn rejects_private_key_in_header() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let now = Utc::now();
        let private: &Map<String, Value> = key_pair.private_key().jwk().as_ref();
        let header = json!({
            "typ": "dpop+jwt",
            "alg": "ES256",
            "jwk": private,
        });
        let claims = json!({"jti": "x", "htm": "GET", "htu": URL, "iat": now.timestamp()});
        let jwt = sign_compact_jws(&header, &claims, key_pair.private_key(), Algorithm::ES256).unwrap();
        assert!(matches!(
            verify_proof(policy(), &jwt, expected(None), now),
            Err(DpopVerifyError::PrivateJwk)
        ));
    }

    #[test]
    fn builds_htu_from_public_base() {
        assert_eq!(
            build_htu_from_base("https://api.example.com", "/profile?x=1").unwrap(),
            "https://api.example.com/profile?x=1"
        );
    }
}
