//! Single-use authorization codes with PKCE (S256) and optional `dpop_jkt`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use dpop_core::jws::sha256_b64url;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Authorization codes live this long.
pub const CODE_TTL_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGrant {
    pub client_id: String,
    pub redirect_uri: String,
    pub subject: String,
    pub scope: String,
    /// base64url(SHA-256(code_verifier))
    pub code_challenge: String,
    /// RFC 9449 section 10: the DPoP key the code is bound to.
    pub dpop_jkt: Option<String>,
}

#[derive(Debug)]
struct StoredCode {
    grant: PendingGrant,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AuthorizationCodes {
    codes: Mutex<HashMap<String, StoredCode>>,
}

impl AuthorizationCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue(&self, grant: PendingGrant, now: DateTime<Utc>) -> String {
        let code = Uuid::new_v4().simple().to_string();
        let mut codes = self.codes.lock().await;
        codes.retain(|_, stored| stored.expires_at > now);
        codes.insert(
            code.clone(),
            StoredCode {
                grant,
                expires_at: now + Duration::seconds(CODE_TTL_SECONDS),
            },
        );
        code
    }

    /// Remove and return the grant for `code`. A second call returns `None`.
    pub async fn consume(&self, code: &str, now: DateTime<Utc>) -> Option<PendingGrant> {
        let stored = self.codes.lock().await.remove(code)?;
        (stored.expires_at > now).then_some(stored.grant)
    }
}

/// PKCE S256 check (RFC 7636 section 4.6).
pub fn verifier_matches(code_verifier: &str, code_challenge: &str) -> bool {
    let well_formed = (43..=128).contains(&code_verifier.len())
        && code_verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-._~".contains(&b));
    well_formed && sha256_b64url(code_verifier.as_bytes()) == code_challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> PendingGrant {
        PendingGrant {
            client_id: "myapp-client-id".into(),
            redirect_uri: "https://app.example.com/callback".into(),
            subject: "user@example.com".into(),
            scope: "openid profile email".into(),
            code_challenge: "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into(),
            dpop_jkt: None,
        }
    }

    #[tokio::test]
    async fn codes_are_single_use() {
        let codes = AuthorizationCodes::new();
        let now = Utc::now();
        let code = codes.issue(grant(), now).await;

        assert_eq!(codes.consume(&code, now).await, Some(grant()));
        assert_eq!(codes.consume(&code, now).await, None);
    }

    #[tokio::test]
    async fn expired_codes_are_refused() {
        let codes = AuthorizationCodes::new();
        let now = Utc::now();
        let code = codes.issue(grant(), now).await;
        let later = now + Duration::seconds(CODE_TTL_SECONDS + 1);
        assert_eq!(codes.consume(&code, later).await, None);
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        assert!(verifier_matches(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
        assert!(!verifier_matches(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXx",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
        assert!(!verifier_matches("short", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }
}
