/*
 * Responsibility
 * - The authenticated context handlers see
 * - The access middleware verifies token + proof and stores it in request extensions
 */

/// Context attached to a request that passed DPoP authentication.
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: String,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    /// Access token `jti`.
    pub jti: String,
    /// Thumbprint of the key the token is bound to.
    pub dpop_jkt: String,
}

impl AuthCtx {
    pub fn new(subject: impl Into<String>, jti: impl Into<String>, dpop_jkt: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            client_id: None,
            scopes: Vec::new(),
            jti: jti.into(),
            dpop_jkt: dpop_jkt.into(),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scopes = scope.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }
}
