/*
 * Responsibility
 * - Config loading -> service construction -> Router assembly
 * - Middleware wiring for both simulated servers
 * - Runs the walkthrough against them (in-process, no sockets)
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use dpop_core::generate_key_pair;
use dpop_core::replay::MemoryReplayStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware::{self, http::HttpLimits};
use crate::services::AuthService;
use crate::state::{AppState, ClientRegistration};
use crate::walkthrough::{Walkthrough, network::Network};

fn init_tracing() {
    // RUST_LOG wins; e.g. RUST_LOG=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr may be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("loading configuration")?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        env = ?config.app_env,
        alg = %config.demo.algorithm,
        access_token_alg = %config.demo.access_token_algorithm,
        auth_server = %config.demo.auth_server_url,
        api = %config.api_base_url,
        "starting DPoP walkthrough"
    );

    let state = build_state(&config).await?;
    let network = build_network(&config, state);
    let report = Walkthrough::new(config, network).echo(true).run().await?;

    println!(
        "Done: access token bound to {} ({} attacks rejected).",
        report.thumbprint,
        report.attacks.len()
    );
    Ok(())
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    // The authorization server's own signing key for access tokens.
    let signing_key = generate_key_pair(config.demo.access_token_algorithm)
        .await
        .context("generating the authorization server signing key")?;

    let issuer = config.demo.auth_server_url.as_str().trim_end_matches('/');
    let audience = config.api_base_url.as_str().trim_end_matches('/');

    let auth = Arc::new(AuthService::new(
        signing_key,
        issuer,
        audience,
        config.access_token_scope.clone(),
        config.access_token_ttl_seconds,
        config.dpop_policy(),
        Arc::new(MemoryReplayStore::new()),
    ));

    let client = ClientRegistration {
        client_id: config.client_id.clone(),
        redirect_uri: config.redirect_uri.to_string(),
        user_email: config.user_email.clone(),
    };

    Ok(AppState::new(
        auth,
        client,
        config.demo.auth_server_url.clone(),
        config.api_base_url.clone(),
    ))
}

pub fn build_auth_server(state: AppState) -> Router {
    let router = api::oauth::routes().with_state(state);
    let router = middleware::security_headers::apply(router);
    middleware::http::apply(router, HttpLimits::default())
}

pub fn build_resource_server(state: AppState) -> Router {
    let router = api::resource::routes(state.clone()).with_state(state);
    let router = middleware::security_headers::apply(router);
    middleware::http::apply(router, HttpLimits::default())
}

pub fn build_network(config: &Config, state: AppState) -> Network {
    let mut network = Network::new();
    network.register(&config.demo.auth_server_url, build_auth_server(state.clone()));
    network.register(&config.api_base_url, build_resource_server(state));
    network
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chrono::Utc;
    use dpop_core::{Algorithm, KeyPair, ProofRequest, build_dpop_proof};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::error::{BEARER_NOT_ALLOWED, ErrorResponse};

    async fn setup() -> (Config, AppState) {
        let config = Config::from_lookup(|_| None).unwrap();
        let state = build_state(&config).await.unwrap();
        (config, state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
        let bytes = to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn metadata_advertises_every_algorithm() {
        let (_, state) = setup().await;
        let res = build_auth_server(state)
            .oneshot(
                Request::get("/.well-known/oauth-authorization-server")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
        let body: Value = body_json(res).await;
        assert_eq!(body["issuer"], "https://auth.example.com");
        assert_eq!(
            body["dpop_signing_alg_values_supported"]
                .as_array()
                .unwrap()
                .len(),
            Algorithm::ALL.len()
        );
    }

    #[tokio::test]
    async fn jwks_publishes_the_signing_key_without_private_members() {
        let (_, state) = setup().await;
        let kid = state.auth.key_id().to_string();
        let res = build_auth_server(state)
            .oneshot(Request::get("/.well-known/jwks.json").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body: Value = body_json(res).await;
        let key = &body["keys"][0];
        assert_eq!(key["kid"], kid.as_str());
        assert_eq!(key["kty"], "RSA");
        assert!(key.get("d").is_none());
    }

    #[tokio::test]
    async fn authorize_requires_pkce() {
        let (_, state) = setup().await;
        let uri = "/oauth/authorize?response_type=code&client_id=myapp-client-id\
                   &redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback";
        let res = build_auth_server(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(res).await;
        assert_eq!(body.error, "invalid_request");
        assert!(body.error_description.contains("code_challenge"));
    }

    #[tokio::test]
    async fn authorize_rejects_unregistered_redirect() {
        let (_, state) = setup().await;
        let uri = "/oauth/authorize?response_type=code&client_id=myapp-client-id\
                   &redirect_uri=https%3A%2F%2Fevil.example.com%2Fcb\
                   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM\
                   &code_challenge_method=S256";
        let res = build_auth_server(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn token_endpoint_requires_a_dpop_proof() {
        let (_, state) = setup().await;
        let res = build_auth_server(state)
            .oneshot(
                Request::post("/oauth/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("grant_type=authorization_code&code=abc"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(res).await;
        assert_eq!(body.error, "invalid_dpop_proof");
    }

    #[tokio::test]
    async fn token_endpoint_rejects_unknown_grant_type() {
        let (_, state) = setup().await;
        let res = build_auth_server(state)
            .oneshot(
                Request::post("/oauth/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("grant_type=password"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body: ErrorResponse = body_json(res).await;
        assert_eq!(body.error, "unsupported_grant_type");
    }

    #[tokio::test]
    async fn token_endpoint_rejects_unknown_codes_after_a_valid_proof() {
        let (_, state) = setup().await;
        let key = KeyPair::generate(Algorithm::ES256).unwrap();
        let proof = build_dpop_proof(
            Algorithm::ES256,
            &key,
            ProofRequest::new("POST", "https://auth.example.com/oauth/token", Utc::now()),
        )
        .unwrap();

        let res = build_auth_server(state)
            .oneshot(
                Request::post("/oauth/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header("dpop", proof)
                    .body(Body::from(
                        "grant_type=authorization_code&code=nope&client_id=myapp-client-id\
                         &redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback&code_verifier=x",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(res).await;
        assert_eq!(body.error, "invalid_grant");
    }

    #[tokio::test]
    async fn resource_server_rejects_bound_token_as_bearer() {
        let (_, state) = setup().await;
        let key = KeyPair::generate(Algorithm::ES256).unwrap();
        let issued = state
            .auth
            .issue_access_token("user@example.com", "myapp-client-id", key.thumbprint(), Utc::now())
            .unwrap();

        let res = build_resource_server(state)
            .oneshot(
                Request::get("/profile")
                    .header(header::AUTHORIZATION, format!("Bearer {}", issued.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = body_json(res).await;
        assert_eq!(body.error, "invalid_token");
        assert_eq!(body.error_description, BEARER_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn resource_server_challenges_missing_credentials() {
        let (_, state) = setup().await;
        let res = build_resource_server(state)
            .oneshot(Request::get("/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let challenge = res.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("DPoP "));
        assert!(challenge.contains("ES256"));
    }

    #[tokio::test]
    async fn resource_server_serves_profile_for_a_valid_proof() {
        let (_, state) = setup().await;
        let key = KeyPair::generate(Algorithm::ES384).unwrap();
        let issued = state
            .auth
            .issue_access_token("user@example.com", "myapp-client-id", key.thumbprint(), Utc::now())
            .unwrap();
        let proof = build_dpop_proof(
            Algorithm::ES384,
            &key,
            ProofRequest::new("GET", "https://api.example.com/profile", Utc::now())
                .with_access_token(&issued.access_token),
        )
        .unwrap();

        let res = build_resource_server(state)
            .oneshot(
                Request::get("/profile")
                    .header(header::AUTHORIZATION, format!("DPoP {}", issued.access_token))
                    .header("dpop", proof)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = body_json(res).await;
        assert_eq!(body["sub"], "user@example.com");
        assert_eq!(body["cnf_jkt"], key.thumbprint());
    }
}
