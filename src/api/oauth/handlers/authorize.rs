/*
 * Responsibility
 * - GET /oauth/authorize
 * - The user is treated as already logged in; the code goes straight back to
 *   the registered redirect_uri (302) together with `state`
 */
use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::info;
use url::Url;

use crate::api::oauth::dto::AuthorizeQuery;
use crate::error::AppError;
use crate::services::authorization_codes::PendingGrant;
use crate::state::AppState;

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest(format!("missing {name}")))
}

pub async fn authorize(
    State(state): State<AppState>,
    Query(q): Query<AuthorizeQuery>,
) -> Result<Response, AppError> {
    let client_id = required(q.client_id, "client_id")?;
    if client_id != state.client.client_id {
        return Err(AppError::InvalidRequest("unknown client_id".into()));
    }

    let redirect_uri = required(q.redirect_uri, "redirect_uri")?;
    if redirect_uri != state.client.redirect_uri {
        return Err(AppError::InvalidRequest(
            "redirect_uri does not match the registered value".into(),
        ));
    }

    let response_type = required(q.response_type, "response_type")?;
    if response_type != "code" {
        return Err(AppError::UnsupportedResponseType(response_type));
    }

    let code_challenge = required(q.code_challenge, "code_challenge")?;
    if q.code_challenge_method.as_deref() != Some("S256") {
        return Err(AppError::InvalidRequest(
            "code_challenge_method must be S256".into(),
        ));
    }

    let grant = PendingGrant {
        client_id,
        redirect_uri: redirect_uri.clone(),
        subject: state.client.user_email.clone(),
        scope: q.scope.unwrap_or_default(),
        code_challenge,
        dpop_jkt: q.dpop_jkt.filter(|jkt| !jkt.is_empty()),
    };
    let bound = grant.dpop_jkt.is_some();
    let code = state.codes.issue(grant, Utc::now()).await;
    info!(dpop_jkt_bound = bound, "authorization code issued");

    let mut location = Url::parse(&redirect_uri).map_err(|_| AppError::Internal)?;
    {
        let mut pairs = location.query_pairs_mut();
        pairs.append_pair("code", &code);
        if let Some(s) = q.state.as_deref() {
            pairs.append_pair("state", s);
        }
    }

    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
}
