/*
 * Responsibility
 * - Shared context for both simulated servers (AppState)
 * - Clone is cheap: services sit behind Arc
 */
use std::sync::Arc;

use dpop_core::settings::AuthorizationServerMetadata;
use url::Url;

use crate::services::{AuthService, AuthorizationCodes};

/// The one registered client and the user who logs in with it.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub redirect_uri: String,
    pub user_email: String,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub codes: Arc<AuthorizationCodes>,
    pub metadata: Arc<AuthorizationServerMetadata>,
    pub client: Arc<ClientRegistration>,
    /// Public origin of the authorization server, used to rebuild `htu`.
    pub auth_base_url: Url,
    /// Public origin of the resource server, used to rebuild `htu`.
    pub api_base_url: Url,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        client: ClientRegistration,
        auth_base_url: Url,
        api_base_url: Url,
    ) -> Self {
        Self {
            metadata: Arc::new(AuthorizationServerMetadata::for_issuer(&auth_base_url)),
            auth,
            codes: Arc::new(AuthorizationCodes::new()),
            client: Arc::new(client),
            auth_base_url,
            api_base_url,
        }
    }
}
