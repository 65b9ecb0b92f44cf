//! Compact JWS serialization: `base64url(header).base64url(payload).base64url(sig)`.
//!
//! Signing and verification go through josekit's per-algorithm signers so the
//! primitive always follows [`Algorithm`]: ECDSA with the curve's hash,
//! RSASSA-PKCS1-v1_5, RSA-PSS with salt length equal to the digest length, and
//! EdDSA for the Edwards curves.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use josekit::jwk::Jwk;
use josekit::jws::{
    ES256, ES384, ES512, EdDSA, JwsSigner, JwsVerifier, PS256, PS384, PS512, RS256, RS384, RS512,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::algorithm::Algorithm;
use crate::error::{DecodeError, SigningError, VerifyError};
use crate::jwk::CanonicalJwk;
use crate::keys::PrivateKey;

pub fn b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn sha256_b64url(input: &[u8]) -> String {
    b64url(&Sha256::digest(input))
}

fn b64url_json(value: &Value) -> Result<String, serde_json::Error> {
    let s = serde_json::to_string(value)?;
    Ok(b64url(s.as_bytes()))
}

pub(crate) fn signer_for(alg: Algorithm, jwk: &Jwk) -> Result<Box<dyn JwsSigner>, josekit::JoseError> {
    Ok(match alg {
        Algorithm::ES256 => Box::new(ES256.signer_from_jwk(jwk)?),
        Algorithm::ES384 => Box::new(ES384.signer_from_jwk(jwk)?),
        Algorithm::ES512 => Box::new(ES512.signer_from_jwk(jwk)?),
        Algorithm::RS256 => Box::new(RS256.signer_from_jwk(jwk)?),
        Algorithm::RS384 => Box::new(RS384.signer_from_jwk(jwk)?),
        Algorithm::RS512 => Box::new(RS512.signer_from_jwk(jwk)?),
        Algorithm::PS256 => Box::new(PS256.signer_from_jwk(jwk)?),
        Algorithm::PS384 => Box::new(PS384.signer_from_jwk(jwk)?),
        Algorithm::PS512 => Box::new(PS512.signer_from_jwk(jwk)?),
        // Ed25519 and Ed448 share one EdDSA signer; the jwk's crv selects the curve.
        Algorithm::Ed25519 | Algorithm::Ed448 => Box::new(EdDSA.signer_from_jwk(jwk)?),
    })
}

fn verifier_for(alg: Algorithm, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, josekit::JoseError> {
    Ok(match alg {
        Algorithm::ES256 => Box::new(ES256.verifier_from_jwk(jwk)?),
        Algorithm::ES384 => Box::new(ES384.verifier_from_jwk(jwk)?),
        Algorithm::ES512 => Box::new(ES512.verifier_from_jwk(jwk)?),
        Algorithm::RS256 => Box::new(RS256.verifier_from_jwk(jwk)?),
        Algorithm::RS384 => Box::new(RS384.verifier_from_jwk(jwk)?),
        Algorithm::RS512 => Box::new(RS512.verifier_from_jwk(jwk)?),
        Algorithm::PS256 => Box::new(PS256.verifier_from_jwk(jwk)?),
        Algorithm::PS384 => Box::new(PS384.verifier_from_jwk(jwk)?),
        Algorithm::PS512 => Box::new(PS512.verifier_from_jwk(jwk)?),
        Algorithm::Ed25519 | Algorithm::Ed448 => Box::new(EdDSA.verifier_from_jwk(jwk)?),
    })
}

/// Sign `header` and `payload` with `private_key` and return the compact JWS.
///
/// The header must already carry `alg` equal to `alg`; the key must have been
/// generated (or imported) for `alg`. Neither is ever adjusted to make the
/// call succeed.
pub fn sign_compact_jws<H, P>(
    header: &H,
    payload: &P,
    private_key: &PrivateKey,
    alg: Algorithm,
) -> Result<String, SigningError>
where
    H: Serialize + ?Sized,
    P: Serialize + ?Sized,
{
    if private_key.algorithm() != alg {
        return Err(SigningError::KeyMismatch {
            key: private_key.algorithm(),
            requested: alg,
        });
    }

    let header = serde_json::to_value(header)?;
    match header.get("alg").and_then(Value::as_str) {
        Some(value) if value == alg.as_str() => {}
        Some(value) => {
            return Err(SigningError::HeaderAlgMismatch {
                header: value.to_string(),
                requested: alg,
            });
        }
        None => return Err(SigningError::MissingHeaderAlg),
    }
    let payload = serde_json::to_value(payload)?;

    let signing_input = format!("{}.{}", b64url_json(&header)?, b64url_json(&payload)?);

    let provider_err = |source| SigningError::Provider {
        algorithm: alg,
        source,
    };
    let signer = signer_for(alg, private_key.jwk()).map_err(provider_err)?;
    let signature = signer.sign(signing_input.as_bytes()).map_err(provider_err)?;

    debug!(alg = %alg, sig_len = signature.len(), "signed compact jws");
    Ok(format!("{}.{}", signing_input, b64url(&signature)))
}

/// A compact JWS split into its decoded parts.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJws {
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub signature: Vec<u8>,
    /// `base64url(header).base64url(payload)` exactly as received.
    pub signing_input: String,
}

impl DecodedJws {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    pub fn payload_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

fn decode_json_segment(
    segment: &str,
    name: &'static str,
) -> Result<Map<String, Value>, DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| DecodeError::Base64(name))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeError::Json {
            segment: name,
            message: "not an object".to_string(),
        }),
        Err(e) => Err(DecodeError::Json {
            segment: name,
            message: e.to_string(),
        }),
    }
}

/// Decode a compact JWS for display. Does not check the signature.
pub fn decode_compact(token: &str) -> Result<DecodedJws, DecodeError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return Err(DecodeError::SegmentCount(parts.len()));
    };

    for (segment, name) in [(header, "header"), (payload, "payload"), (signature, "signature")] {
        if segment.is_empty() {
            return Err(DecodeError::EmptySegment(name));
        }
    }

    Ok(DecodedJws {
        header: decode_json_segment(header, "header")?,
        payload: decode_json_segment(payload, "payload")?,
        signature: URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| DecodeError::Base64("signature"))?,
        signing_input: format!("{}.{}", header, payload),
    })
}

/// Verify a compact JWS against a public JWK using `alg`'s verifier.
///
/// Only the RFC 7638 public members of `public_jwk` are used, so display-only
/// members such as `alg` or `kid` never influence verification.
pub fn verify_compact_jws(
    token: &str,
    public_jwk: &Map<String, Value>,
    alg: Algorithm,
) -> Result<DecodedJws, VerifyError> {
    let decoded = decode_compact(token)?;

    let header_alg = decoded.header_str("alg").unwrap_or_default();
    if header_alg != alg.as_str() {
        return Err(VerifyError::AlgorithmMismatch {
            header: header_alg.to_string(),
            expected: alg,
        });
    }

    let key_err = |source| VerifyError::Key {
        algorithm: alg,
        source,
    };
    let canonical = CanonicalJwk::from_jwk(public_jwk)?;
    // josekit's EdDSA verifier accepts either Edwards curve; pin it to `alg`.
    if canonical.key_type() != alg.key_type() || canonical.curve() != alg.curve() {
        return Err(VerifyError::KeyMismatch {
            algorithm: alg,
            kty: canonical.key_type(),
            crv: canonical.curve().map(str::to_string),
        });
    }
    let jwk = Jwk::from_map(canonical.to_map()).map_err(key_err)?;
    let verifier = verifier_for(alg, &jwk).map_err(key_err)?;

    verifier
        .verify(decoded.signing_input.as_bytes(), &decoded.signature)
        .map_err(|_| VerifyError::BadSignature)?;

    Ok(decoded)
}
