//! DPoP proof construction (RFC 9449 section 4).
//!
//! A [`ProofRequest`] is consumed by [`build_dpop_proof`], so every outbound
//! request has to describe itself (method, URI, issue time) again and gets a
//! fresh `jti`. There is no way to ask the builder for "the last proof".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::algorithm::Algorithm;
use crate::error::ProofError;
use crate::jws::{sha256_b64url, sign_compact_jws};
use crate::keys::KeyPair;

pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Protected header of a DPoP proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpopHeader {
    pub typ: String,
    pub alg: Algorithm,
    /// Public key members only; never private material.
    pub jwk: Map<String, Value>,
}

/// DPoP proof claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Description of the single HTTP request a proof will accompany.
#[derive(Debug)]
pub struct ProofRequest<'a> {
    method: &'a str,
    uri: &'a str,
    issued_at: DateTime<Utc>,
    access_token: Option<&'a str>,
    nonce: Option<&'a str>,
}

impl<'a> ProofRequest<'a> {
    pub fn new(method: &'a str, uri: &'a str, issued_at: DateTime<Utc>) -> Self {
        Self {
            method,
            uri,
            issued_at,
            access_token: None,
            nonce: None,
        }
    }

    /// Bind the proof to an access token (adds `ath`).
    pub fn with_access_token(mut self, access_token: &'a str) -> Self {
        self.access_token = Some(access_token);
        self
    }

    /// Echo a server-provided `DPoP-Nonce`.
    pub fn with_nonce(mut self, nonce: &'a str) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

/// `ath`: base64url(SHA-256(access token)).
pub fn access_token_hash(access_token: &str) -> String {
    sha256_b64url(access_token.as_bytes())
}

/// `htm`: the method uppercased; must be a non-empty RFC 9110 token.
pub fn normalize_htm(method: &str) -> Result<String, ProofError> {
    let is_tchar = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if method.is_empty() || !method.chars().all(is_tchar) {
        return Err(ProofError::InvalidMethod(method.to_string()));
    }
    Ok(method.to_ascii_uppercase())
}

/// `htu`: the absolute http(s) URI without query and fragment.
pub fn normalize_htu(uri: &str) -> Result<String, ProofError> {
    let mut url = url::Url::parse(uri).map_err(|e| ProofError::InvalidUri(format!("{uri}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProofError::InvalidUri(format!("{uri}: not an http(s) url")));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Build and sign a DPoP proof for one request.
///
/// `algorithm` must be the algorithm `key_pair` was generated for; a mismatch
/// fails with a signing error instead of falling back to the key's algorithm.
pub fn build_dpop_proof(
    algorithm: Algorithm,
    key_pair: &KeyPair,
    request: ProofRequest<'_>,
) -> Result<String, ProofError> {
    let header = DpopHeader {
        typ: DPOP_JWT_TYPE.to_string(),
        alg: algorithm,
        jwk: key_pair.canonical_public_jwk().to_map(),
    };

    let claims = DpopClaims {
        jti: Uuid::new_v4().to_string(),
        htm: normalize_htm(request.method)?,
        htu: normalize_htu(request.uri)?,
        iat: request.issued_at.timestamp(),
        ath: request.access_token.map(access_token_hash),
        nonce: request.nonce.map(str::to_string),
    };

    let proof = sign_compact_jws(&header, &claims, key_pair.private_key(), algorithm)?;
    tracing::debug!(alg = %algorithm, htm = %claims.htm, htu = %claims.htu, jti = %claims.jti, "built dpop proof");
    Ok(proof)
}
