/*
 * Responsibility
 * - GET /.well-known/oauth-authorization-server (RFC 8414)
 * - GET /.well-known/jwks.json
 */
use axum::{Json, extract::State};
use dpop_core::settings::AuthorizationServerMetadata;
use serde_json::Value;

use crate::state::AppState;

pub async fn metadata(State(state): State<AppState>) -> Json<AuthorizationServerMetadata> {
    Json(state.metadata.as_ref().clone())
}

pub async fn jwks(State(state): State<AppState>) -> Json<Value> {
    Json(state.auth.jwks())
}
