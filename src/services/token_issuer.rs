//! Access-token issuing (authorization server side) and verification
//! (resource server side), sharing one signing key.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dpop_core::access_token::{AccessTokenClaims, verify_access_token};
use dpop_core::error::VerifyError;
use dpop_core::replay::ReplayStore;
use dpop_core::verify::DpopPolicy;
use dpop_core::{JwsSealer, KeyPair, TokenGrant, assemble_demo_access_token};
use serde_json::{Map, Value, json};
use tracing::error;

use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum AccessTokenError {
    #[error("access token verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("unexpected issuer {0:?}")]
    Issuer(String),
    #[error("unexpected audience {0:?}")]
    Audience(String),
    #[error("access token expired")]
    Expired,
    #[error("empty '{0}' claim")]
    EmptyClaim(&'static str),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
    pub scope: String,
}

/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct AuthService {
    sealer: JwsSealer,
    issuer: String,
    audience: String,
    scope: String,
    ttl_seconds: u64,
    dpop_policy: DpopPolicy,
    replay_store: Arc<dyn ReplayStore>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("kid", &self.key_id())
            .field("dpop_policy", &self.dpop_policy)
            .finish()
    }
}

impl AuthService {
    pub fn new(
        signing_key: KeyPair,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        scope: impl Into<String>,
        ttl_seconds: u64,
        dpop_policy: DpopPolicy,
        replay_store: Arc<dyn ReplayStore>,
    ) -> Self {
        Self {
            sealer: JwsSealer::new(signing_key),
            issuer: issuer.into(),
            audience: audience.into(),
            scope: scope.into(),
            ttl_seconds,
            dpop_policy,
            replay_store,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_id(&self) -> &str {
        self.sealer.key_pair().thumbprint()
    }

    pub fn dpop_policy(&self) -> DpopPolicy {
        self.dpop_policy
    }

    pub fn replay_store(&self) -> &dyn ReplayStore {
        self.replay_store.as_ref()
    }

    /// JWKS document with the access-token verification key.
    pub fn jwks(&self) -> Value {
        let public: &Map<String, Value> = self.sealer.key_pair().public_jwk().as_ref();
        let mut jwk = public.clone();
        jwk.insert("kid".to_string(), Value::String(self.key_id().to_string()));
        jwk.insert("use".to_string(), Value::String("sig".to_string()));
        json!({ "keys": [jwk] })
    }

    /// Issue an access token bound to the DPoP key with thumbprint `jkt`.
    pub fn issue_access_token(
        &self,
        subject: &str,
        client_id: &str,
        jkt: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AppError> {
        let ttl = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(AppError::Internal)?;

        let grant = TokenGrant {
            issuer: self.issuer.clone(),
            subject: subject.to_string(),
            audience: self.audience.clone(),
            scope: self.scope.clone(),
            client_id: Some(client_id.to_string()),
            issued_at: now,
            lifetime: ttl,
        };

        let access_token = assemble_demo_access_token(&grant, jkt, &self.sealer).map_err(|e| {
            error!(error = %e, "failed to sign access token");
            AppError::Internal
        })?;

        Ok(IssuedToken {
            access_token,
            expires_in: self.ttl_seconds,
            scope: self.scope.clone(),
        })
    }

    /// Verify signature, `iss`, `aud` and `exp`.
    pub fn verify_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, AccessTokenError> {
        let key_pair = self.sealer.key_pair();
        let (_, claims) =
            verify_access_token(token, key_pair.public_jwk().as_ref(), key_pair.algorithm())?;

        if claims.iss != self.issuer {
            return Err(AccessTokenError::Issuer(claims.iss));
        }
        if claims.aud != self.audience {
            return Err(AccessTokenError::Audience(claims.aud));
        }
        if claims.exp <= now.timestamp() {
            return Err(AccessTokenError::Expired);
        }
        if claims.sub.trim().is_empty() {
            return Err(AccessTokenError::EmptyClaim("sub"));
        }
        if claims.cnf.jkt.trim().is_empty() {
            return Err(AccessTokenError::EmptyClaim("cnf.jkt"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use dpop_core::Algorithm;
    use dpop_core::replay::MemoryReplayStore;

    use super::*;

    fn service(ttl_seconds: u64) -> AuthService {
        AuthService::new(
            KeyPair::generate(Algorithm::ES256).unwrap(),
            "https://auth.example.com",
            "https://api.example.com",
            "read write",
            ttl_seconds,
            DpopPolicy::default(),
            Arc::new(MemoryReplayStore::new()),
        )
    }

    #[test]
    fn issued_token_verifies_and_carries_binding() {
        let auth = service(3600);
        let now = Utc::now();
        let issued = auth
            .issue_access_token("user@example.com", "myapp-client-id", "jkt-1", now)
            .unwrap();
        assert_eq!(issued.expires_in, 3600);

        let claims = auth.verify_access_token(&issued.access_token, now).unwrap();
        assert_eq!(claims.cnf.jkt, "jkt-1");
        assert_eq!(claims.client_id.as_deref(), Some("myapp-client-id"));
        assert_eq!(claims.scope, "read write");
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = service(60);
        let issued_at = Utc::now() - Duration::seconds(120);
        let issued = auth
            .issue_access_token("user@example.com", "myapp-client-id", "jkt-1", issued_at)
            .unwrap();
        assert!(matches!(
            auth.verify_access_token(&issued.access_token, Utc::now()),
            Err(AccessTokenError::Expired)
        ));
    }

    #[test]
    fn token_from_another_issuer_key_is_rejected() {
        let ours = service(3600);
        let theirs = service(3600);
        let issued = theirs
            .issue_access_token("user@example.com", "c", "jkt", Utc::now())
            .unwrap();
        assert!(matches!(
            ours.verify_access_token(&issued.access_token, Utc::now()),
            Err(AccessTokenError::Verify(_))
        ));
    }

    #[test]
    fn jwks_publishes_public_key_only() {
        let auth = service(3600);
        let jwks = auth.jwks();
        let key = &jwks["keys"][0];
        assert_eq!(key["kid"], auth.key_id());
        assert_eq!(key["kty"], "EC");
        assert!(key.get("d").is_none());
    }
}
