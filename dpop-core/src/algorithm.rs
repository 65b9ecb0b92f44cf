//! Signature algorithms supported for DPoP proofs and demo access tokens.
//!
//! Every per-algorithm decision (key generation, header `alg`, signing
//! primitive) is an exhaustive `match` on [`Algorithm`], so adding or
//! removing a variant is a compile-time change in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ThumbprintError, UnsupportedAlgorithm};

/// JWS `alg` values the demo can generate keys for and sign with.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    ES256,
    ES384,
    ES512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    Ed25519,
    Ed448,
}

impl Algorithm {
    pub const ALL: [Algorithm; 11] = [
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::ES512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::Ed25519,
        Algorithm::Ed448,
    ];

    /// The value written to the JWS header `alg` member.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES512 => "ES512",
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::PS256 => "PS256",
            Algorithm::PS384 => "PS384",
            Algorithm::PS512 => "PS512",
            Algorithm::Ed25519 => "Ed25519",
            Algorithm::Ed448 => "Ed448",
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 => KeyType::Ec,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => KeyType::Rsa,
            Algorithm::Ed25519 | Algorithm::Ed448 => KeyType::Okp,
        }
    }

    /// JWK `crv` for curve-based algorithms; `None` for RSA.
    pub fn curve(&self) -> Option<&'static str> {
        match self {
            Algorithm::ES256 => Some("P-256"),
            Algorithm::ES384 => Some("P-384"),
            Algorithm::ES512 => Some("P-521"),
            Algorithm::Ed25519 => Some("Ed25519"),
            Algorithm::Ed448 => Some("Ed448"),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => None,
        }
    }

    /// Digest length in bytes of the hash paired with this algorithm.
    ///
    /// For RSA-PSS this is also the salt length. EdDSA hashes internally,
    /// so the Edwards variants report `None`.
    pub fn hash_len(&self) -> Option<usize> {
        match self {
            Algorithm::ES256 | Algorithm::RS256 | Algorithm::PS256 => Some(32),
            Algorithm::ES384 | Algorithm::RS384 | Algorithm::PS384 => Some(48),
            Algorithm::ES512 | Algorithm::RS512 | Algorithm::PS512 => Some(64),
            Algorithm::Ed25519 | Algorithm::Ed448 => None,
        }
    }

    /// Human-readable description shown next to the algorithm picker.
    pub fn description(&self) -> &'static str {
        match self {
            Algorithm::ES256 => "ECDSA using P-256 and SHA-256",
            Algorithm::ES384 => "ECDSA using P-384 and SHA-384",
            Algorithm::ES512 => "ECDSA using P-521 and SHA-512",
            Algorithm::RS256 => "RSASSA-PKCS1-v1_5 using SHA-256",
            Algorithm::RS384 => "RSASSA-PKCS1-v1_5 using SHA-384",
            Algorithm::RS512 => "RSASSA-PKCS1-v1_5 using SHA-512",
            Algorithm::PS256 => "RSASSA-PSS using SHA-256 and MGF1 with SHA-256",
            Algorithm::PS384 => "RSASSA-PSS using SHA-384 and MGF1 with SHA-384",
            Algorithm::PS512 => "RSASSA-PSS using SHA-512 and MGF1 with SHA-512",
            Algorithm::Ed25519 => "EdDSA using the Ed25519 curve",
            Algorithm::Ed448 => "EdDSA using the Ed448 curve",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| UnsupportedAlgorithm(s.to_string()))
    }
}

/// JWK `kty` values the thumbprint calculator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ec,
    Rsa,
    Okp,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ec => "EC",
            KeyType::Rsa => "RSA",
            KeyType::Okp => "OKP",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ThumbprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EC" => Ok(KeyType::Ec),
            "RSA" => Ok(KeyType::Rsa),
            "OKP" => Ok(KeyType::Okp),
            other => Err(ThumbprintError::UnsupportedKeyType(other.to_string())),
        }
    }
}
