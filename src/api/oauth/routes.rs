/*
 * Responsibility
 * - URL layout of the simulated authorization server
 */
use axum::{
    Router,
    routing::{get, post},
};
use dpop_core::settings::{AUTHORIZE_PATH, JWKS_PATH, METADATA_PATH, TOKEN_PATH};

use crate::api::oauth::handlers::{
    authorize::authorize,
    metadata::{jwks, metadata},
    token::token,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(METADATA_PATH, get(metadata))
        .route(JWKS_PATH, get(jwks))
        .route(AUTHORIZE_PATH, get(authorize))
        .route(TOKEN_PATH, post(token))
}
