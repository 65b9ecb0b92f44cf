/*
 * Responsibility
 * - URL layout of the simulated resource server
 * - Every route requires DPoP authentication
 */
use axum::{Router, routing::get};

use crate::api::resource::handlers::profile::profile;
use crate::middleware;
use crate::state::AppState;

pub const PROFILE_PATH: &str = "/profile";

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new().route(PROFILE_PATH, get(profile));
    middleware::auth::access::apply(protected, state)
}
