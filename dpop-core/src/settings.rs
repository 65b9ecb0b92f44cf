//! Validation of user-supplied demo settings.
//!
//! Algorithm names and server URLs arrive as untrusted strings. Any URL that
//! credentials derived from the core could be sent to must be HTTPS and must
//! not point at loopback, private, link-local or metadata addresses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::algorithm::Algorithm;
use crate::error::SettingsError;

pub const AUTHORIZE_PATH: &str = "/oauth/authorize";
pub const TOKEN_PATH: &str = "/oauth/token";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";
pub const METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

fn forbidden_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn forbidden_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return forbidden_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// Parse and validate a URL that the demo may send DPoP material to.
pub fn validate_server_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "https" {
        return Err(SettingsError::InsecureScheme(raw.to_string()));
    }

    let forbidden = match url.host() {
        None => {
            return Err(SettingsError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Some(Host::Ipv4(ip)) => forbidden_v4(ip),
        Some(Host::Ipv6(ip)) => forbidden_v6(ip),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            let domain = domain.trim_end_matches('.');
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.contains("metadata")
                || domain
                    .parse::<IpAddr>()
                    .map(|ip| match ip {
                        IpAddr::V4(v4) => forbidden_v4(v4),
                        IpAddr::V6(v6) => forbidden_v6(v6),
                    })
                    .unwrap_or(false)
        }
    };

    if forbidden {
        return Err(SettingsError::ForbiddenHost(raw.to_string()));
    }
    Ok(url)
}

/// RFC 8414 authorization server metadata (the members the demo uses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Metadata for a server hosted at `issuer` with the default paths.
    pub fn for_issuer(issuer: &Url) -> Self {
        let endpoints = Endpoints::defaults_for(issuer);
        Self {
            issuer: issuer.as_str().trim_end_matches('/').to_string(),
            authorization_endpoint: endpoints.authorization.to_string(),
            token_endpoint: endpoints.token.to_string(),
            jwks_uri: endpoints.jwks.to_string(),
            dpop_signing_alg_values_supported: Algorithm::ALL
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }

    /// Algorithms both sides support, in the server's order.
    pub fn supported_algorithms(&self) -> Vec<Algorithm> {
        self.dpop_signing_alg_values_supported
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorization: Url,
    pub token: Url,
    pub jwks: Url,
}

impl Endpoints {
    pub fn defaults_for(base: &Url) -> Self {
        let at = |path: &str| {
            let mut url = base.clone();
            url.set_path(path);
            url.set_query(None);
            url.set_fragment(None);
            url
        };
        Self {
            authorization: at(AUTHORIZE_PATH),
            token: at(TOKEN_PATH),
            jwks: at(JWKS_PATH),
        }
    }

    /// Endpoints discovered from metadata; each one is validated.
    pub fn from_metadata(metadata: &AuthorizationServerMetadata) -> Result<Self, SettingsError> {
        Ok(Self {
            authorization: validate_server_url(&metadata.authorization_endpoint)?,
            token: validate_server_url(&metadata.token_endpoint)?,
            jwks: validate_server_url(&metadata.jwks_uri)?,
        })
    }
}

/// Demo settings after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSettings {
    pub algorithm: Algorithm,
    pub access_token_algorithm: Algorithm,
    pub auth_server_url: Url,
    pub endpoints: Endpoints,
}

impl DemoSettings {
    pub fn parse(
        algorithm: &str,
        access_token_algorithm: &str,
        auth_server_url: &str,
    ) -> Result<Self, SettingsError> {
        let auth_server_url = validate_server_url(auth_server_url)?;
        Ok(Self {
            algorithm: algorithm.parse()?,
            access_token_algorithm: access_token_algorithm.parse()?,
            endpoints: Endpoints::defaults_for(&auth_server_url),
            auth_server_url,
        })
    }

    /// Replace the default endpoints with discovered ones.
    pub fn with_metadata(mut self, metadata: &AuthorizationServerMetadata) -> Result<Self, SettingsError> {
        self.endpoints = Endpoints::from_metadata(metadata)?;
        Ok(self)
    }
}
