/*
 * Responsibility
 * - Load walkthrough settings from the environment (.env supported)
 * - Validate them up front: unknown algorithms or unsafe server URLs fail startup
 */
use std::fmt;

use dpop_core::settings::{DemoSettings, validate_server_url};
use dpop_core::verify::DpopPolicy;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key, reason) => {
                write!(f, "invalid configuration: {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,

    /// DPoP algorithm, access-token algorithm and authorization server URL.
    pub demo: DemoSettings,
    pub api_base_url: Url,

    pub client_id: String,
    pub redirect_uri: Url,
    pub oauth_scope: String,
    pub access_token_scope: String,
    pub user_email: String,
    pub access_token_ttl_seconds: u64,

    pub dpop_iat_leeway_seconds: i64,
    pub dpop_max_age_seconds: i64,
    pub dpop_replay_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        let demo = DemoSettings::parse(
            &var("DPOP_ALGORITHM", "ES256"),
            &var("ACCESS_TOKEN_ALGORITHM", "RS256"),
            &var("AUTH_SERVER_URL", "https://auth.example.com"),
        )
        .map_err(|e| ConfigError::Invalid("DPOP_ALGORITHM/ACCESS_TOKEN_ALGORITHM/AUTH_SERVER_URL", e.to_string()))?;

        let api_base_url = validate_server_url(&var("API_BASE_URL", "https://api.example.com"))
            .map_err(|e| ConfigError::Invalid("API_BASE_URL", e.to_string()))?;

        let redirect_uri = Url::parse(&var("REDIRECT_URI", "https://app.example.com/callback"))
            .map_err(|e| ConfigError::Invalid("REDIRECT_URI", e.to_string()))?;

        let client_id = var("CLIENT_ID", "myapp-client-id");
        if client_id.trim().is_empty() {
            return Err(ConfigError::Missing("CLIENT_ID"));
        }

        Ok(Self {
            app_env,
            demo,
            api_base_url,
            client_id,
            redirect_uri,
            oauth_scope: var("OAUTH_SCOPE", "openid profile email"),
            access_token_scope: var("ACCESS_TOKEN_SCOPE", "read write"),
            user_email: var("USER_EMAIL", "user@example.com"),
            access_token_ttl_seconds: parse_or(&lookup, "ACCESS_TOKEN_TTL_SECONDS", 3600)?,
            dpop_iat_leeway_seconds: parse_or(&lookup, "DPOP_IAT_LEEWAY_SECONDS", 60)?,
            dpop_max_age_seconds: parse_or(&lookup, "DPOP_MAX_AGE_SECONDS", 300)?,
            dpop_replay_ttl_seconds: parse_or(&lookup, "DPOP_REPLAY_TTL_SECONDS", 300)?,
        })
    }

    /// Proof policy for endpoints that take an access token.
    pub fn dpop_policy(&self) -> DpopPolicy {
        DpopPolicy {
            iat_leeway_seconds: self.dpop_iat_leeway_seconds,
            max_age_seconds: self.dpop_max_age_seconds,
            require_ath: true,
            replay_ttl_seconds: self.dpop_replay_ttl_seconds,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use dpop_core::Algorithm;

    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_demo() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.demo.algorithm, Algorithm::ES256);
        assert_eq!(config.demo.access_token_algorithm, Algorithm::RS256);
        assert_eq!(config.demo.auth_server_url.as_str(), "https://auth.example.com/");
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/");
        assert_eq!(config.client_id, "myapp-client-id");
        assert_eq!(config.oauth_scope, "openid profile email");
        assert_eq!(config.access_token_ttl_seconds, 3600);
        assert!(config.dpop_policy().require_ath);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = config_with(&[("DPOP_ALGORITHM", "HS256")]).unwrap_err();
        assert!(err.to_string().contains("HS256"));
    }

    #[test]
    fn rejects_internal_server_urls() {
        assert!(config_with(&[("AUTH_SERVER_URL", "https://169.254.169.254")]).is_err());
        assert!(config_with(&[("API_BASE_URL", "http://api.example.com")]).is_err());
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        let err = config_with(&[("ACCESS_TOKEN_TTL_SECONDS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ACCESS_TOKEN_TTL_SECONDS", _)));
    }

    #[test]
    fn production_env_is_recognised() {
        let config = config_with(&[("APP_ENV", "PROD"), ("DPOP_ALGORITHM", "Ed448")]).unwrap();
        assert!(config.app_env.is_production());
        assert_eq!(config.demo.algorithm, Algorithm::Ed448);
    }
}
