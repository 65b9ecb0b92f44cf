//! Canonical JWK members and JWK thumbprints (RFC 7638).

use serde_json::{Map, Value};

use crate::algorithm::KeyType;
use crate::error::ThumbprintError;
use crate::jws::sha256_b64url;

/// Members that only appear in private (or symmetric) JWKs.
const PRIVATE_MEMBERS: [&str; 8] = ["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

/// The RFC 7638 required members of a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalJwk {
    Ec {
        crv: String,
        kty: &'static str,
        x: String,
        y: String,
    },
    Rsa {
        e: String,
        kty: &'static str,
        n: String,
    },
    Okp {
        crv: String,
        kty: &'static str,
        x: String,
    },
}

impl CanonicalJwk {
    /// Project any JWK (public or private) down to its required public members.
    ///
    /// Member values are copied verbatim; base64url fields are never re-encoded.
    pub fn from_jwk(jwk: &Map<String, Value>) -> Result<Self, ThumbprintError> {
        let kty = jwk
            .get("kty")
            .and_then(Value::as_str)
            .ok_or_else(|| ThumbprintError::UnsupportedKeyType(String::new()))?
            .parse::<KeyType>()?;

        let canonical = match kty {
            KeyType::Ec => CanonicalJwk::Ec {
                crv: member(jwk, kty, "crv")?,
                kty: kty.as_str(),
                x: member(jwk, kty, "x")?,
                y: member(jwk, kty, "y")?,
            },
            KeyType::Rsa => CanonicalJwk::Rsa {
                e: member(jwk, kty, "e")?,
                kty: kty.as_str(),
                n: member(jwk, kty, "n")?,
            },
            KeyType::Okp => CanonicalJwk::Okp {
                crv: member(jwk, kty, "crv")?,
                kty: kty.as_str(),
                x: member(jwk, kty, "x")?,
            },
        };

        Ok(canonical)
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            CanonicalJwk::Ec { .. } => KeyType::Ec,
            CanonicalJwk::Rsa { .. } => KeyType::Rsa,
            CanonicalJwk::Okp { .. } => KeyType::Okp,
        }
    }

    /// `crv` for curve keys, `None` for RSA.
    pub fn curve(&self) -> Option<&str> {
        match self {
            CanonicalJwk::Ec { crv, .. } | CanonicalJwk::Okp { crv, .. } => Some(crv),
            CanonicalJwk::Rsa { .. } => None,
        }
    }

    /// Required members as (name, value) pairs, in lexicographic name order.
    pub fn members(&self) -> Vec<(&'static str, &str)> {
        match self {
            CanonicalJwk::Ec { crv, kty, x, y } => vec![
                ("crv", crv.as_str()),
                ("kty", *kty),
                ("x", x.as_str()),
                ("y", y.as_str()),
            ],
            CanonicalJwk::Rsa { e, kty, n } => {
                vec![("e", e.as_str()), ("kty", *kty), ("n", n.as_str())]
            }
            CanonicalJwk::Okp { crv, kty, x } => {
                vec![("crv", crv.as_str()), ("kty", *kty), ("x", x.as_str())]
            }
        }
    }

    /// Compact JSON with no whitespace: the thumbprint hash input.
    pub fn to_json(&self) -> String {
        let body = self
            .members()
            .into_iter()
            .map(|(name, value)| format!("\"{name}\":{}", Value::from(value)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{body}}}")
    }

    /// The canonical members as a JSON object (used for the DPoP `jwk` header).
    pub fn to_map(&self) -> Map<String, Value> {
        self.members()
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::from(value)))
            .collect()
    }

    /// base64url(SHA-256(canonical JSON)), no padding.
    pub fn thumbprint(&self) -> String {
        sha256_b64url(self.to_json().as_bytes())
    }
}

fn member(
    jwk: &Map<String, Value>,
    kty: KeyType,
    name: &'static str,
) -> Result<String, ThumbprintError> {
    jwk.get(name)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ThumbprintError::MissingMember {
            kty: kty.as_str(),
            member: name,
        })
}

/// Compute the RFC 7638 thumbprint of a JWK.
pub fn compute_jwk_thumbprint(jwk: &Map<String, Value>) -> Result<String, ThumbprintError> {
    Ok(CanonicalJwk::from_jwk(jwk)?.thumbprint())
}

/// True when the JWK carries private key material.
pub fn has_private_members(jwk: &Map<String, Value>) -> bool {
    PRIVATE_MEMBERS.iter().any(|m| jwk.contains_key(*m))
}

/// Copy of a JWK with every private member removed, for rendering to humans.
pub fn redact_private_members(jwk: &Map<String, Value>) -> Map<String, Value> {
    jwk.iter()
        .filter(|(k, _)| !PRIVATE_MEMBERS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Pretty JSON of a JWK with private members removed.
pub fn format_jwk_for_display(jwk: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(&redact_private_members(jwk)).unwrap_or_default()
}
