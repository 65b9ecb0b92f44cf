//! Key-pair generation and JWK export.
//!
//! A [`KeyPair`] is generated for exactly one [`Algorithm`] and stays tagged
//! with it: the private half refuses to sign for any other algorithm.

use std::fmt;

use josekit::jwk::Jwk;
use josekit::jwk::alg::ec::EcCurve;
use josekit::jwk::alg::ed::EdCurve;
use tracing::{debug, warn};

use crate::algorithm::Algorithm;
use crate::error::{KeyGenError, KeyImportError};
use crate::jwk::{CanonicalJwk, format_jwk_for_display, has_private_members};
use crate::jws::signer_for;

/// RSA modulus size for RS* and PS* keys. The public exponent is 65537.
pub const RSA_MODULUS_BITS: u32 = 2048;

fn provider_rejected(algorithm: Algorithm, source: josekit::JoseError) -> KeyGenError {
    warn!(alg = %algorithm, error = %source, "crypto provider rejected key generation");
    KeyGenError::AlgorithmNotSupportedByPlatform { algorithm, source }
}

/// Private half of a key pair, tagged with the algorithm it was made for.
///
/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct PrivateKey {
    algorithm: Algorithm,
    jwk: Jwk,
}

impl PrivateKey {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A generated key pair with its exported public JWK and cached thumbprint.
#[derive(Clone)]
pub struct KeyPair {
    algorithm: Algorithm,
    public_jwk: Jwk,
    private_key: PrivateKey,
    canonical: CanonicalJwk,
    thumbprint: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

fn generate_private_jwk(algorithm: Algorithm) -> Result<Jwk, josekit::JoseError> {
    match algorithm {
        Algorithm::ES256 => Jwk::generate_ec_key(EcCurve::P256),
        Algorithm::ES384 => Jwk::generate_ec_key(EcCurve::P384),
        Algorithm::ES512 => Jwk::generate_ec_key(EcCurve::P521),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Jwk::generate_rsa_key(RSA_MODULUS_BITS),
        Algorithm::Ed25519 => Jwk::generate_ed_key(EdCurve::Ed25519),
        Algorithm::Ed448 => Jwk::generate_ed_key(EdCurve::Ed448),
    }
}

impl KeyPair {
    /// Generate a key pair on the current thread.
    ///
    /// RSA generation can take a noticeable fraction of a second; async
    /// callers should use [`generate_key_pair`] instead.
    pub fn generate(algorithm: Algorithm) -> Result<Self, KeyGenError> {
        let private_jwk = generate_private_jwk(algorithm)
            .map_err(|source| provider_rejected(algorithm, source))?;
        Self::from_generated(algorithm, private_jwk)
    }

    fn from_generated(algorithm: Algorithm, private_jwk: Jwk) -> Result<Self, KeyGenError> {
        let unsupported = |source| provider_rejected(algorithm, source);

        // Prove the provider can sign with the new key before handing it out.
        signer_for(algorithm, &private_jwk).map_err(unsupported)?;
        let mut public_jwk = private_jwk.to_public_key().map_err(unsupported)?;
        public_jwk.set_algorithm(algorithm.as_str());

        let canonical = CanonicalJwk::from_jwk(public_jwk.as_ref())?;
        let thumbprint = canonical.thumbprint();

        debug!(alg = %algorithm, jkt = %thumbprint, "generated key pair");

        Ok(Self {
            algorithm,
            public_jwk,
            private_key: PrivateKey {
                algorithm,
                jwk: private_jwk,
            },
            canonical,
            thumbprint,
        })
    }

    /// Wrap an existing private JWK, checking that it fits `algorithm`.
    pub fn from_private_jwk(algorithm: Algorithm, private_jwk: Jwk) -> Result<Self, KeyImportError> {
        if !has_private_members(private_jwk.as_ref()) {
            return Err(KeyImportError::NotPrivate);
        }

        let canonical = CanonicalJwk::from_jwk(private_jwk.as_ref())?;
        if canonical.key_type() != algorithm.key_type() || canonical.curve() != algorithm.curve() {
            return Err(KeyImportError::WrongKey {
                algorithm,
                kty: canonical.key_type(),
                crv: canonical.curve().map(str::to_string),
            });
        }
        signer_for(algorithm, &private_jwk)
            .map_err(|source| KeyImportError::Rejected { algorithm, source })?;

        let mut public_jwk = private_jwk
            .to_public_key()
            .map_err(KeyImportError::InvalidJwk)?;
        public_jwk.set_algorithm(algorithm.as_str());

        Ok(Self {
            algorithm,
            public_jwk,
            private_key: PrivateKey {
                algorithm,
                jwk: private_jwk,
            },
            thumbprint: canonical.thumbprint(),
            canonical,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Exported public JWK, including `alg` for display.
    pub fn public_jwk(&self) -> &Jwk {
        &self.public_jwk
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// RFC 7638 thumbprint of the public key (the `cnf.jkt` value).
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// The public members that go into a DPoP header `jwk`.
    pub fn canonical_public_jwk(&self) -> &CanonicalJwk {
        &self.canonical
    }

    /// Pretty-printed public JWK, never including private members.
    pub fn display_public_jwk(&self) -> String {
        format_jwk_for_display(self.public_jwk.as_ref())
    }
}

/// Generate a key pair without blocking the async runtime.
pub async fn generate_key_pair(algorithm: Algorithm) -> Result<KeyPair, KeyGenError> {
    tokio::task::spawn_blocking(move || KeyPair::generate(algorithm)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::compute_jwk_thumbprint;
    use serde_json::Value;

    fn member<'a>(jwk: &'a Jwk, name: &str) -> Option<&'a str> {
        jwk.parameter(name).and_then(Value::as_str)
    }

    #[test]
    fn ec_keys_use_the_matching_curve() {
        for (alg, crv) in [
            (Algorithm::ES256, "P-256"),
            (Algorithm::ES384, "P-384"),
            (Algorithm::ES512, "P-521"),
        ] {
            let key_pair = KeyPair::generate(alg).unwrap();
            assert_eq!(key_pair.public_jwk().key_type(), "EC");
            assert_eq!(member(key_pair.public_jwk(), "crv"), Some(crv));
            assert_eq!(member(key_pair.public_jwk(), "alg"), Some(alg.as_str()));
        }
    }

    #[test]
    fn rsa_keys_are_2048_bit_with_f4_exponent() {
        let key_pair = KeyPair::generate(Algorithm::PS384).unwrap();
        let jwk = key_pair.public_jwk();
        assert_eq!(jwk.key_type(), "RSA");
        assert_eq!(member(jwk, "e"), Some("AQAB"));
        // 256 bytes of modulus -> 342 base64url characters.
        assert_eq!(member(jwk, "n").map(str::len), Some(342));
    }

    #[test]
    fn edwards_keys_are_okp() {
        let key_pair = KeyPair::generate(Algorithm::Ed25519).unwrap();
        assert_eq!(key_pair.public_jwk().key_type(), "OKP");
        assert_eq!(member(key_pair.public_jwk(), "crv"), Some("Ed25519"));
    }

    #[test]
    fn public_export_has_no_private_members() {
        for alg in [Algorithm::ES256, Algorithm::RS256, Algorithm::Ed25519] {
            let key_pair = KeyPair::generate(alg).unwrap();
            assert!(!has_private_members(key_pair.public_jwk().as_ref()));
            assert!(has_private_members(key_pair.private_key().jwk().as_ref()));
            assert!(!key_pair.display_public_jwk().contains("\"d\""));
        }
    }

    #[test]
    fn cached_thumbprint_matches_recomputation() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let recomputed = compute_jwk_thumbprint(key_pair.public_jwk().as_ref()).unwrap();
        assert_eq!(key_pair.thumbprint(), recomputed);
        assert_eq!(key_pair.canonical_public_jwk().thumbprint(), recomputed);
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key_pair = KeyPair::generate(Algorithm::ES256).unwrap();
        let d = member(key_pair.private_key().jwk(), "d").unwrap().to_string();
        let shown = format!("{:?}", key_pair);
        assert!(!shown.contains(&d));
        assert!(!format!("{:?}", key_pair.private_key()).contains(&d));
    }

    #[test]
    fn provider_failure_is_reported_as_unsupported_by_platform() {
        let rsa = KeyPair::generate(Algorithm::RS256).unwrap();
        let err = KeyPair::from_generated(Algorithm::ES256, rsa.private_key().jwk().clone())
            .unwrap_err();
        assert!(matches!(
            err,
            KeyGenError::AlgorithmNotSupportedByPlatform { algorithm: Algorithm::ES256, .. }
        ));
        assert!(err.to_string().starts_with("ES256 is not supported by the crypto provider"));
    }

    #[test]
    fn import_round_trips_and_checks_algorithm() {
        let original = KeyPair::generate(Algorithm::ES384).unwrap();
        let private = original.private_key().jwk().clone();

        let imported = KeyPair::from_private_jwk(Algorithm::ES384, private.clone()).unwrap();
        assert_eq!(imported.thumbprint(), original.thumbprint());

        let err = KeyPair::from_private_jwk(Algorithm::ES256, private).unwrap_err();
        assert!(matches!(
            err,
            KeyImportError::WrongKey { algorithm: Algorithm::ES256, .. }
        ));

        let err = KeyPair::from_private_jwk(Algorithm::RS256, imported.private_key().jwk().clone())
            .unwrap_err();
        assert!(matches!(err, KeyImportError::WrongKey { .. }));

        let err = KeyPair::from_private_jwk(Algorithm::ES384, original.public_jwk().clone())
            .unwrap_err();
        assert!(matches!(err, KeyImportError::NotPrivate));
    }

    #[tokio::test]
    async fn async_generation_runs_off_the_runtime() {
        let key_pair = generate_key_pair(Algorithm::RS256).await.unwrap();
        assert_eq!(key_pair.algorithm(), Algorithm::RS256);
        assert_eq!(key_pair.private_key().algorithm(), Algorithm::RS256);
    }
}
