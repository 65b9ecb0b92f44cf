//! Error types for the DPoP core.
//!
//! Each stage of the pipeline fails with its own enum so callers can tell
//! "pick another algorithm" apart from "this is a programming error".

use thiserror::Error;

use crate::algorithm::{Algorithm, KeyType};

/// The requested `alg` is not one of the eleven supported values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported algorithm: {0:?}")]
pub struct UnsupportedAlgorithm(pub String);

#[derive(Debug, Error)]
pub enum KeyGenError {
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),

    /// The algorithm is known, but the crypto provider cannot generate or
    /// export keys for it (e.g. an OpenSSL build without Ed448).
    #[error("{algorithm} is not supported by the crypto provider: {source}")]
    AlgorithmNotSupportedByPlatform {
        algorithm: Algorithm,
        #[source]
        source: josekit::JoseError,
    },

    #[error("generated key could not be exported: {0}")]
    Export(#[from] ThumbprintError),

    #[error("key generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum KeyImportError {
    #[error("jwk is not a private key")]
    NotPrivate,

    #[error("{kty} key (crv {crv:?}) cannot be used for {algorithm}")]
    WrongKey {
        algorithm: Algorithm,
        kty: KeyType,
        crv: Option<String>,
    },

    #[error("crypto provider rejected the jwk for {algorithm}: {source}")]
    Rejected {
        algorithm: Algorithm,
        #[source]
        source: josekit::JoseError,
    },

    #[error("invalid jwk: {0}")]
    InvalidJwk(#[source] josekit::JoseError),

    #[error(transparent)]
    Thumbprint(#[from] ThumbprintError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThumbprintError {
    #[error("unsupported key type: {0:?}")]
    UnsupportedKeyType(String),

    #[error("{kty} jwk is missing required member {member:?}")]
    MissingMember { kty: &'static str, member: &'static str },
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("private key belongs to {key}, refusing to sign with {requested}")]
    KeyMismatch { key: Algorithm, requested: Algorithm },

    #[error("header alg {header:?} does not match signing algorithm {requested}")]
    HeaderAlgMismatch { header: String, requested: Algorithm },

    #[error("header has no alg member")]
    MissingHeaderAlg,

    #[error("failed to serialize jws segment: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("crypto provider rejected signing with {algorithm}: {source}")]
    Provider {
        algorithm: Algorithm,
        #[source]
        source: josekit::JoseError,
    },
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("invalid http method: {0:?}")]
    InvalidMethod(String),

    #[error("invalid http uri: {0}")]
    InvalidUri(String),

    #[error(transparent)]
    Thumbprint(#[from] ThumbprintError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("compact jws must have exactly three segments, found {0}")]
    SegmentCount(usize),

    #[error("{0} segment is empty")]
    EmptySegment(&'static str),

    #[error("{0} segment is not base64url")]
    Base64(&'static str),

    #[error("{segment} segment is not a json object: {message}")]
    Json {
        segment: &'static str,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("header alg {header:?} does not match verifier algorithm {expected}")]
    AlgorithmMismatch { header: String, expected: Algorithm },

    #[error(transparent)]
    Thumbprint(#[from] ThumbprintError),

    #[error("{kty} key (crv {crv:?}) cannot verify {algorithm}")]
    KeyMismatch {
        algorithm: Algorithm,
        kty: KeyType,
        crv: Option<String>,
    },

    #[error("public key cannot verify {algorithm}: {source}")]
    Key {
        algorithm: Algorithm,
        #[source]
        source: josekit::JoseError,
    },

    #[error("signature verification failed")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("url {0:?} must use https")]
    InsecureScheme(String),

    #[error("url {0:?} points at a local or private network address")]
    ForbiddenHost(String),
}
