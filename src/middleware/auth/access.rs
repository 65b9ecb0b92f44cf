//! Access token (JWT + DPoP) verification for the resource server; on success
//! an [`AuthCtx`] is put into request extensions.
//!
//! Order of checks:
//! 1. `Authorization` scheme. `Bearer` with a DPoP-bound token is a downgrade (400).
//! 2. Access token signature, `iss`, `aud`, `exp`.
//! 3. DPoP proof: signature, `htm`/`htu`/`iat`, `ath`, key == `cnf.jkt`.
//! 4. `jti` replay.

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};
use chrono::Utc;
use dpop_core::access_token::decode_access_token;
use dpop_core::verify::{DpopVerifyError, ExpectedRequest, build_htu_from_base, verify_proof};

use crate::api::extractors::AuthCtx;
use crate::error::{AppError, BEARER_NOT_ALLOWED, PUBLIC_KEY_MISMATCH};
use crate::middleware::auth::single_proof;
use crate::state::AppState;

/// Protect every route of `router` with DPoP authentication.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // from_fn cannot take a State extractor in axum 0.8, so pass it explicitly
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

enum Scheme<'a> {
    Dpop(&'a str),
    Bearer(&'a str),
}

fn split_authorization(value: &str) -> Option<Scheme<'_>> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("DPoP") {
        Some(Scheme::Dpop(token))
    } else if scheme.eq_ignore_ascii_case("Bearer") {
        Some(Scheme::Bearer(token))
    } else {
        None
    }
}

fn describe(err: &DpopVerifyError) -> String {
    match err {
        DpopVerifyError::JktMismatch | DpopVerifyError::BadSignature => {
            PUBLIC_KEY_MISMATCH.to_string()
        }
        other => format!("DPoP proof rejected: {other}"),
    }
}

async fn access_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::invalid_token("missing access token"))?;

    let token = match split_authorization(auth) {
        Some(Scheme::Dpop(token)) => token,
        Some(Scheme::Bearer(token)) => {
            // A token we can read and that carries cnf.jkt must never be
            // accepted as a bearer token.
            if decode_access_token(token).is_ok() {
                tracing::warn!("DPoP-bound access token presented as Bearer");
                return Err(AppError::SchemeDowngrade(BEARER_NOT_ALLOWED.to_string()));
            }
            return Err(AppError::invalid_token("unrecognised access token"));
        }
        None => return Err(AppError::invalid_token("unsupported authorization scheme")),
    };

    let now = Utc::now();
    let claims = match state.auth.verify_access_token(token, now) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = ?err, "access token verification failed");
            return Err(AppError::invalid_token(err.to_string()));
        }
    };

    let proof = single_proof(req.headers())
        .ok_or_else(|| AppError::invalid_dpop_proof("missing or repeated DPoP header"))?;

    let path = original_uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or(original_uri.path());
    let htu = build_htu_from_base(state.api_base_url.as_str(), path).map_err(|e| {
        tracing::warn!(error = %e, "cannot rebuild request uri");
        AppError::Internal
    })?;

    let policy = state.auth.dpop_policy();
    let verified = verify_proof(
        policy,
        proof,
        ExpectedRequest {
            method: req.method().as_str(),
            htu: &htu,
            access_token: Some(token),
            expected_jkt: Some(&claims.cnf.jkt),
        },
        now,
    )
    .map_err(|err| {
        tracing::warn!(error = ?err, "dpop verification failed");
        AppError::invalid_dpop_proof(describe(&err))
    })?;

    let key = format!("rs:{}:{}", claims.sub, verified.jti);
    let first_time = state
        .auth
        .replay_store()
        .check_and_store(&key, policy.replay_ttl_for(verified.iat, now))
        .await
        .map_err(|err| {
            tracing::warn!(error = ?err, "replay backend failure");
            AppError::invalid_dpop_proof("replay check failed")
        })?;
    if !first_time {
        tracing::warn!(key = %key, "dpop replay detected");
        return Err(AppError::invalid_dpop_proof("DPoP proof replay detected"));
    }

    let auth_ctx = AuthCtx::new(&claims.sub, &claims.jti, &claims.cnf.jkt)
        .with_scope(&claims.scope)
        .with_client_id(claims.client_id.clone());

    // middleware -> extractor
    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}
