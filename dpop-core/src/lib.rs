//! Client-side DPoP (RFC 9449) proof pipeline.
//!
//! Key generation for eleven JOSE algorithms, RFC 7638 thumbprints, compact
//! JWS signing, DPoP proof construction and a demo access-token assembler,
//! plus the server-side checks the walkthrough's simulated servers run.

pub mod access_token;
pub mod algorithm;
pub mod error;
pub mod jwk;
pub mod jws;
pub mod keys;
pub mod proof;
pub mod replay;
pub mod session;
pub mod settings;
pub mod verify;

pub use access_token::{
    AccessTokenClaims, AccessTokenHeader, JwsSealer, MockSealer, TokenGrant, TokenSealer,
    assemble_demo_access_token,
};
pub use algorithm::{Algorithm, KeyType};
pub use error::{
    KeyGenError, KeyImportError, ProofError, SettingsError, SigningError, ThumbprintError,
    UnsupportedAlgorithm, VerifyError,
};
pub use jwk::{CanonicalJwk, compute_jwk_thumbprint};
pub use jws::{decode_compact, sign_compact_jws, verify_compact_jws};
pub use keys::{KeyPair, PrivateKey, generate_key_pair};
pub use proof::{ProofRequest, access_token_hash, build_dpop_proof};
pub use session::KeySession;
