//! Service configuration sourced from environment variables.
//!
//! Every setting has a default so the binary starts without any environment,
//! although logins only succeed once the provider endpoint, signing secret and
//! at least one seed user are configured.

use chrono::Duration;

/// Runtime configuration for the service.
///
/// `url_scheme`/`url_host` define the canonical public URL of this service.
/// Redirect and return URLs are always rebuilt from these values rather than
/// from the incoming request, so a forged Host header cannot steer the
/// provider round trip somewhere else.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_port: u16,
    pub url_scheme: String,
    pub url_host: String,
    /// OpenID 2.0 endpoint of the fixed identity provider.
    pub sso_endpoint: String,
    /// HMAC secret for session tokens. Empty means token issuance fails.
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// Seed account lists for the in-memory user store, one per role.
    pub standard_users: Vec<String>,
    pub admins: Vec<String>,
    pub superusers: Vec<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let http_port = std::env::var("SERIALMINT_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let url_scheme = std::env::var("SERIALMINT_URL_SCHEME").unwrap_or_else(|_| "http".to_string());
        let url_host =
            std::env::var("SERIALMINT_URL_HOST").unwrap_or_else(|_| format!("localhost:{}", http_port));
        let sso_endpoint = std::env::var("SERIALMINT_SSO_ENDPOINT")
            .unwrap_or_else(|_| "https://sso.example.com/openid".to_string());
        let jwt_secret = std::env::var("SERIALMINT_JWT_SECRET").unwrap_or_default();
        let ttl_hours = std::env::var("SERIALMINT_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        Self {
            http_port,
            url_scheme,
            url_host,
            sso_endpoint,
            jwt_secret,
            token_ttl: Duration::hours(ttl_hours.max(1)),
            standard_users: parse_user_list(std::env::var("SERIALMINT_STANDARD_USERS").ok()),
            admins: parse_user_list(std::env::var("SERIALMINT_ADMINS").ok()),
            superusers: parse_user_list(std::env::var("SERIALMINT_SUPERUSERS").ok()),
        }
    }

    /// Canonical base URL of this service, e.g. `https://serial.example.com`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.url_scheme, self.url_host)
    }
}

fn parse_user_list(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(s) => s
            .split(',')
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect(),
        None => Vec::new(),
    }
}
