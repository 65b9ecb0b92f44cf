/*
 * Responsibility
 * - GET /profile (DPoP-protected)
 */
use axum::Json;

use crate::api::extractors::AuthCtxExtractor;
use crate::api::resource::dto::ProfileResponse;

pub async fn profile(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        email: ctx.subject.clone(),
        sub: ctx.subject,
        scope: ctx.scopes,
        client_id: ctx.client_id,
        cnf_jkt: ctx.dpop_jkt,
    })
}
