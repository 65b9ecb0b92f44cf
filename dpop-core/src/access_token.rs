//! DPoP-bound access tokens for the demo (RFC 9068 shape, RFC 9449 `cnf.jkt`).
//!
//! Claim assembly and signing are split: [`assemble_demo_access_token`] only
//! builds the header and claims, and a [`TokenSealer`] produces the signature.
//! [`MockSealer`] gives a decorative signature for display; [`JwsSealer`]
//! signs for real with an authorization-server key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::algorithm::Algorithm;
use crate::error::{DecodeError, SigningError, VerifyError};
use crate::jws::{b64url, decode_compact, sign_compact_jws, verify_compact_jws};
use crate::keys::KeyPair;

pub const ACCESS_TOKEN_TYPE: &str = "at+jwt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub jkt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub cnf: Confirmation,
}

/// What the authorization server grants; everything except the key binding.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub issuer: String,
    pub subject: String,
    pub audience: String,
    pub scope: String,
    pub client_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub lifetime: Duration,
}

/// Produces the third segment of an access token.
pub trait TokenSealer: Send + Sync {
    /// Header `alg` value.
    fn algorithm(&self) -> Algorithm;

    /// Header `kid` value.
    fn key_id(&self) -> &str;

    /// Turn header and claims into a compact token.
    fn seal(
        &self,
        header: &AccessTokenHeader,
        claims: &AccessTokenClaims,
    ) -> Result<String, SigningError>;
}

/// Decorative, unverifiable signature. Display only.
#[derive(Debug, Clone)]
pub struct MockSealer {
    algorithm: Algorithm,
    key_id: String,
}

impl MockSealer {
    pub fn new(algorithm: Algorithm, key_id: impl Into<String>) -> Self {
        Self {
            algorithm,
            key_id: key_id.into(),
        }
    }
}

impl TokenSealer for MockSealer {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn seal(
        &self,
        header: &AccessTokenHeader,
        claims: &AccessTokenClaims,
    ) -> Result<String, SigningError> {
        let header = b64url(serde_json::to_string(header)?.as_bytes());
        let claims = b64url(serde_json::to_string(claims)?.as_bytes());

        let mut noise = Vec::with_capacity(64);
        for _ in 0..4 {
            noise.extend_from_slice(Uuid::new_v4().as_bytes());
        }
        Ok(format!("{}.{}.{}", header, claims, b64url(&noise)))
    }
}

/// Real signature with the authorization server's key; `kid` is its thumbprint.
#[derive(Debug, Clone)]
pub struct JwsSealer {
    key_pair: KeyPair,
}

impl JwsSealer {
    pub fn new(key_pair: KeyPair) -> Self {
        Self { key_pair }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

impl TokenSealer for JwsSealer {
    fn algorithm(&self) -> Algorithm {
        self.key_pair.algorithm()
    }

    fn key_id(&self) -> &str {
        self.key_pair.thumbprint()
    }

    fn seal(
        &self,
        header: &AccessTokenHeader,
        claims: &AccessTokenClaims,
    ) -> Result<String, SigningError> {
        sign_compact_jws(
            header,
            claims,
            self.key_pair.private_key(),
            self.key_pair.algorithm(),
        )
    }
}

/// Assemble an access token bound to the DPoP key with `thumbprint`.
pub fn assemble_demo_access_token(
    grant: &TokenGrant,
    thumbprint: &str,
    sealer: &dyn TokenSealer,
) -> Result<String, SigningError> {
    let header = AccessTokenHeader {
        alg: sealer.algorithm().as_str().to_string(),
        typ: ACCESS_TOKEN_TYPE.to_string(),
        kid: sealer.key_id().to_string(),
    };

    let claims = AccessTokenClaims {
        iss: grant.issuer.clone(),
        sub: grant.subject.clone(),
        aud: grant.audience.clone(),
        iat: grant.issued_at.timestamp(),
        exp: (grant.issued_at + grant.lifetime).timestamp(),
        jti: Uuid::new_v4().to_string(),
        scope: grant.scope.clone(),
        client_id: grant.client_id.clone(),
        cnf: Confirmation {
            jkt: thumbprint.to_string(),
        },
    };

    sealer.seal(&header, &claims)
}

fn parse_parts(
    header: Map<String, Value>,
    payload: Map<String, Value>,
) -> Result<(AccessTokenHeader, AccessTokenClaims), DecodeError> {
    let json_err = |segment: &'static str| {
        move |e: serde_json::Error| DecodeError::Json {
            segment,
            message: e.to_string(),
        }
    };
    let header = serde_json::from_value(Value::Object(header)).map_err(json_err("header"))?;
    let claims = serde_json::from_value(Value::Object(payload)).map_err(json_err("payload"))?;
    Ok((header, claims))
}

/// Decode an access token for display. Does not check the signature.
pub fn decode_access_token(
    token: &str,
) -> Result<(AccessTokenHeader, AccessTokenClaims), DecodeError> {
    let decoded = decode_compact(token)?;
    parse_parts(decoded.header, decoded.payload)
}

/// Verify an access token signed by [`JwsSealer`] and return its parts.
pub fn verify_access_token(
    token: &str,
    issuer_public_jwk: &Map<String, Value>,
    algorithm: Algorithm,
) -> Result<(AccessTokenHeader, AccessTokenClaims), VerifyError> {
    let decoded = verify_compact_jws(token, issuer_public_jwk, algorithm)?;
    Ok(parse_parts(decoded.header, decoded.payload)?)
}
