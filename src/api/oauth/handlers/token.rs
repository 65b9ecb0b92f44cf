/*
 * Responsibility
 * - POST /oauth/token (authorization_code grant + DPoP proof)
 * - Binds the issued access token to the proof key (cnf.jkt)
 */
use axum::{
    Form, Json,
    extract::{OriginalUri, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use chrono::Utc;
use dpop_core::verify::{DpopPolicy, ExpectedRequest, build_htu_from_base, verify_proof};
use tracing::{info, warn};

use crate::api::oauth::dto::{TokenRequest, TokenResponse};
use crate::error::AppError;
use crate::middleware::auth::single_proof;
use crate::services::authorization_codes::verifier_matches;
use crate::state::AppState;

pub async fn token(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    match req.grant_type.as_deref() {
        Some("authorization_code") => {}
        Some(other) => return Err(AppError::UnsupportedGrantType(other.to_string())),
        None => return Err(AppError::InvalidRequest("missing grant_type".into())),
    }

    // 1) DPoP proof for this request (no access token yet, so no ath).
    let proof = single_proof(&headers)
        .ok_or_else(|| AppError::InvalidDpopProof("missing or repeated DPoP header".into()))?;

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or(uri.path());
    let htu = build_htu_from_base(state.auth_base_url.as_str(), path).map_err(|e| {
        warn!(error = %e, "cannot rebuild token endpoint uri");
        AppError::Internal
    })?;

    let now = Utc::now();
    let policy = DpopPolicy {
        require_ath: false,
        ..state.auth.dpop_policy()
    };
    let verified = verify_proof(
        policy,
        proof,
        ExpectedRequest {
            method: "POST",
            htu: &htu,
            access_token: None,
            expected_jkt: None,
        },
        now,
    )
    .map_err(|err| {
        warn!(error = ?err, "token endpoint dpop verification failed");
        AppError::InvalidDpopProof(err.to_string())
    })?;

    let first_time = state
        .auth
        .replay_store()
        .check_and_store(&format!("as:{}", verified.jti), policy.replay_ttl_for(verified.iat, now))
        .await
        .map_err(|err| {
            warn!(error = ?err, "replay backend failure");
            AppError::InvalidDpopProof("replay check failed".into())
        })?;
    if !first_time {
        warn!(jti = %verified.jti, "dpop replay detected at token endpoint");
        return Err(AppError::InvalidDpopProof("DPoP proof replay detected".into()));
    }

    // 2) Client and code.
    let client_id = req
        .client_id
        .ok_or_else(|| AppError::InvalidRequest("missing client_id".into()))?;
    if client_id != state.client.client_id {
        return Err(AppError::InvalidClient("unknown client".into()));
    }
    let code = req
        .code
        .ok_or_else(|| AppError::InvalidRequest("missing code".into()))?;

    let grant = state
        .codes
        .consume(&code, now)
        .await
        .ok_or_else(|| AppError::InvalidGrant("invalid or expired authorization code".into()))?;

    if grant.client_id != client_id {
        return Err(AppError::InvalidGrant("code was issued to another client".into()));
    }
    if req.redirect_uri.as_deref() != Some(grant.redirect_uri.as_str()) {
        return Err(AppError::InvalidGrant("redirect_uri mismatch".into()));
    }
    let code_verifier = req.code_verifier.unwrap_or_default();
    if !verifier_matches(&code_verifier, &grant.code_challenge) {
        return Err(AppError::InvalidGrant("PKCE verification failed".into()));
    }
    if let Some(bound) = grant.dpop_jkt.as_deref() {
        if bound != verified.jkt {
            return Err(AppError::InvalidDpopProof(
                "DPoP key does not match the dpop_jkt bound to the authorization code".into(),
            ));
        }
    }

    // 3) Issue.
    let issued = state
        .auth
        .issue_access_token(&grant.subject, &client_id, &verified.jkt, now)?;
    info!(alg = %verified.algorithm, jkt = %verified.jkt, "issued DPoP-bound access token");

    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(TokenResponse {
            access_token: issued.access_token,
            token_type: "DPoP".to_string(),
            expires_in: issued.expires_in,
            scope: issued.scope,
        }),
    ))
}
