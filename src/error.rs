/*
 * Responsibility
 * - AppError shared by the simulated authorization and resource servers
 * - IntoResponse: OAuth error JSON ({"error", "error_description"})
 * - 401s from the resource server carry `WWW-Authenticate: DPoP ...`
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use dpop_core::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INVALID_TOKEN: &str = "invalid_token";
pub const INVALID_DPOP_PROOF: &str = "invalid_dpop_proof";
pub const BEARER_NOT_ALLOWED: &str =
    "DPoP-bound access token cannot be used with Bearer authentication scheme";
pub const PUBLIC_KEY_MISMATCH: &str =
    "DPoP proof signature verification failed - public key mismatch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Rejected proof at the token endpoint (400 per RFC 9449 section 5).
    #[error("invalid_dpop_proof: {0}")]
    InvalidDpopProof(String),

    /// A DPoP-bound token presented with the wrong scheme.
    #[error("invalid_token: {0}")]
    SchemeDowngrade(String),

    /// Resource server rejection; answered with a DPoP challenge.
    #[error("{error}: {description}")]
    Unauthorized {
        error: &'static str,
        description: String,
    },

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::Unauthorized {
            error: INVALID_TOKEN,
            description: description.into(),
        }
    }

    pub fn invalid_dpop_proof(description: impl Into<String>) -> Self {
        Self::Unauthorized {
            error: INVALID_DPOP_PROOF,
            description: description.into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::InvalidRequest(m) => (StatusCode::BAD_REQUEST, "invalid_request", m.clone()),
            AppError::InvalidClient(m) => (StatusCode::UNAUTHORIZED, "invalid_client", m.clone()),
            AppError::InvalidGrant(m) => (StatusCode::BAD_REQUEST, "invalid_grant", m.clone()),
            AppError::UnsupportedGrantType(m) => {
                (StatusCode::BAD_REQUEST, "unsupported_grant_type", m.clone())
            }
            AppError::UnsupportedResponseType(m) => {
                (StatusCode::BAD_REQUEST, "unsupported_response_type", m.clone())
            }
            AppError::InvalidDpopProof(m) => (StatusCode::BAD_REQUEST, INVALID_DPOP_PROOF, m.clone()),
            AppError::SchemeDowngrade(m) => (StatusCode::BAD_REQUEST, INVALID_TOKEN, m.clone()),
            AppError::Unauthorized { error, description } => {
                (StatusCode::UNAUTHORIZED, *error, description.clone())
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal server error".into(),
            ),
        }
    }
}

fn dpop_challenge(error: &str) -> Option<HeaderValue> {
    let algs = Algorithm::ALL
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    HeaderValue::from_str(&format!("DPoP error=\"{error}\", algs=\"{algs}\"")).ok()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = ErrorResponse {
            error: code.to_string(),
            error_description: message,
        };

        let mut response = (status, Json(body)).into_response();
        if let AppError::Unauthorized { error, .. } = &self {
            if let Some(value) = dpop_challenge(error) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}
