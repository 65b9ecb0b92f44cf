use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use dpop_core::{
    Algorithm, KeyPair, MockSealer, ProofRequest, TokenGrant, access_token_hash,
    assemble_demo_access_token, build_dpop_proof, decode_compact,
};
use josekit::jwk::Jwk;
use serde_json::{Map, Value};

/// Generate a DPoP proof JWT (JWS compact serialization) for one HTTP request.
///
/// - Generates a fresh key pair for `--alg`, or loads a private JWK
/// - Builds the DPoP header (typ=dpop+jwt, alg, public jwk) and claims
///   (htu, htm, iat, jti, plus ath/nonce when given)
/// - Outputs the proof, the public JWK, its thumbprint (jkt, for cnf.jkt)
///   and the access token hash (ath)
#[derive(Parser, Debug)]
#[command(name = "dpop-gen", version, about)]
struct Args {
    /// Signing algorithm: ES256/384/512, RS256/384/512, PS256/384/512, Ed25519, Ed448
    #[arg(long, default_value = "ES256")]
    alg: String,

    /// HTTP method (htm) e.g. GET/POST/PUT
    #[arg(long, default_value = "GET")]
    method: String,

    /// Full request URL used as htu (query and fragment are dropped)
    #[arg(long)]
    url: String,

    /// Access token string. If provided, ath will be included in the proof.
    #[arg(long, conflicts_with = "demo_access_token")]
    access_token: Option<String>,

    /// Mint a demo access token (unverifiable signature) bound to the key
    /// and use it for ath.
    #[arg(long, default_value_t = false)]
    demo_access_token: bool,

    /// Server-provided DPoP-Nonce to echo
    #[arg(long)]
    nonce: Option<String>,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Sign with this private JWK (JSON file) instead of a fresh key
    #[arg(long, value_name = "FILE")]
    private_jwk: Option<PathBuf>,

    /// Write the generated private JWK here so later runs can reuse it
    #[arg(long, value_name = "FILE", conflicts_with = "private_jwk")]
    save_private_jwk: Option<PathBuf>,

    /// Print only the DPoP token (no extra lines)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn load_key_pair(algorithm: Algorithm, path: &Path) -> Result<KeyPair, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let jwk = Jwk::from_bytes(&bytes)?;
    Ok(KeyPair::from_private_jwk(algorithm, jwk)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let algorithm: Algorithm = args.alg.parse()?;

    let key_pair = match &args.private_jwk {
        Some(path) => load_key_pair(algorithm, path)?,
        None => KeyPair::generate(algorithm)?,
    };
    if let Some(path) = &args.save_private_jwk {
        let private: &Map<String, Value> = key_pair.private_key().jwk().as_ref();
        fs::write(path, serde_json::to_string_pretty(private)?)?;
    }

    let issued_at = match args.iat {
        Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| format!("iat out of range: {secs}"))?,
        None => Utc::now(),
    };

    let access_token = match (&args.access_token, args.demo_access_token) {
        (Some(token), _) => Some(token.clone()),
        (None, true) => {
            let grant = TokenGrant {
                issuer: "https://auth.example.com".to_string(),
                subject: "user@example.com".to_string(),
                audience: "https://api.example.com".to_string(),
                scope: "read write".to_string(),
                client_id: Some("myapp-client-id".to_string()),
                issued_at,
                lifetime: Duration::seconds(3600),
            };
            let sealer = MockSealer::new(Algorithm::RS256, "demo-key");
            Some(assemble_demo_access_token(&grant, key_pair.thumbprint(), &sealer)?)
        }
        (None, false) => None,
    };

    let mut request = ProofRequest::new(&args.method, &args.url, issued_at);
    if let Some(token) = access_token.as_deref() {
        request = request.with_access_token(token);
    }
    if let Some(nonce) = args.nonce.as_deref() {
        request = request.with_nonce(nonce);
    }
    let dpop = build_dpop_proof(algorithm, &key_pair, request)?;

    if args.quiet {
        println!("{}", dpop);
        return Ok(());
    }

    let claims = decode_compact(&dpop)?.payload;
    println!("DPoP: {}", dpop);
    println!("alg: {}", algorithm);
    println!("public jwk:\n{}", key_pair.display_public_jwk());
    println!("jkt (cnf.jkt): {}", key_pair.thumbprint());
    println!("iat: {}", claims.get("iat").cloned().unwrap_or(Value::Null));
    println!("jti: {}", claims.get("jti").and_then(Value::as_str).unwrap_or_default());
    if let Some(token) = access_token.as_deref() {
        if args.demo_access_token {
            println!("access token: {}", token);
        }
        println!("ath: {}", access_token_hash(token));
    } else {
        println!("ath: (none)");
    }

    Ok(())
}
