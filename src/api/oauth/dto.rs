use serde::{Deserialize, Serialize};

/// Query of `GET /oauth/authorize`.
///
/// Everything is optional so that missing parameters produce OAuth errors
/// instead of extractor rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// RFC 9449 section 10 authorization code binding.
    pub dpop_jkt: Option<String>,
}

/// Form body of `POST /oauth/token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "DPoP" here.
    pub token_type: String,
    /// Seconds until expiry.
    pub expires_in: u64,
    pub scope: String,
}
