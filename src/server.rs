//!
//! serialmint HTTP server
//! ----------------------
//! This module defines the Axum-based HTTP surface for serialmint.
//!
//! Responsibilities:
//! - Federated login against the configured identity provider, ending in a
//!   signed session cookie and a redirect into the application.
//! - Best-effort logout that invalidates the session cookie.
//! - Admin-gated registration of signing-key material.
//! - Version and liveness probes.
//!
//! Browser-facing failures render a small HTML page; API routes answer with
//! the uniform JSON envelope from `response`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{
    expired_session_cookie, parse_query, session_cookie, IdentityVerifier, MemoryNonceStore, Role,
    SessionClaims, SsoVerifier, TokenIssuer, SESSION_COOKIE,
};
use crate::keys::decode_public_key;
use crate::response::format_standard_response;
use crate::store::{MemoryUserStore, User, UserStore};

// sreg attributes requested from the provider. Teams are queried for parity
// with the provider's extension surface but carry no policy here.
const SSO_REQUIRED: &[&str] = &["email", "fullname", "nickname"];
const SSO_OPTIONAL: &[&str] = &[];
const SSO_TEAMS: &[&str] = &["device-signers", "ops"];

/// Shared server state injected into all handlers.
///
/// The verifier and user store sit behind trait objects so tests can swap in
/// fakes without standing up a provider or a datastore.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub users: Arc<dyn UserStore>,
    pub issuer: Arc<TokenIssuer>,
}

/// Mount all routes onto a router carrying `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "serialmint ok" }))
        .route("/login", get(login).post(login))
        .route("/logout", get(logout).post(logout))
        .route("/v1/keys", post(register_key))
        .route("/v1/version", get(version))
        .with_state(state)
}

/// Start the serialmint HTTP server with the given configuration.
///
/// Builds the production wiring: an in-memory user store seeded from the
/// configured account lists, the SSO verifier with a fresh nonce store, and
/// the session token issuer.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let users = MemoryUserStore::new();
    seed_users(&users, &config);
    info!("seeded {} accounts from configuration", users.len());

    let verifier = SsoVerifier::new(
        config.sso_endpoint.clone(),
        config.base_url(),
        Arc::new(MemoryNonceStore::default()),
    );
    let issuer = TokenIssuer::new(config.jwt_secret.clone(), config.token_ttl);

    let state = AppState {
        config: config.clone(),
        verifier: Arc::new(verifier),
        users: Arc::new(users),
        issuer: Arc::new(issuer),
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn seed_users(store: &MemoryUserStore, config: &ServiceConfig) {
    for (list, role) in [
        (&config.standard_users, Role::Standard),
        (&config.admins, Role::Admin),
        (&config.superusers, Role::Superuser),
    ] {
        for username in list {
            store.insert(User {
                username: username.clone(),
                name: username.clone(),
                email: String::new(),
                role: role.code(),
            });
        }
    }
}

/// Rebuild the request URL with the configured scheme and host, ignoring
/// whatever Host header the client sent.
fn canonical_url(config: &ServiceConfig, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => {
            format!("{}://{}{}?{}", config.url_scheme, config.url_host, path, q)
        }
        _ => format!("{}://{}{}", config.url_scheme, config.url_host, path),
    }
}

/// Request parameters as the provider sees them: URL query merged with a
/// form-encoded body, body entries winning on duplicates.
fn merged_params(uri: &Uri, body: &str) -> AuthResult<HashMap<String, String>> {
    let mut params = parse_query(uri.query().unwrap_or(""))?;
    params.extend(parse_query(body)?);
    Ok(params)
}

/// The two phases of a login request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginPhase {
    /// Fresh login: hand the browser over to the provider.
    Initiate,
    /// The provider sent the browser back with assertion parameters.
    Callback,
}

impl LoginPhase {
    fn of(params: &HashMap<String, String>) -> Self {
        if params.get("openid.ns").map(String::as_str).unwrap_or("").is_empty() {
            LoginPhase::Initiate
        } else {
            LoginPhase::Callback
        }
    }
}

async fn login(State(state): State<AppState>, uri: Uri, body: String) -> Response {
    let params = match merged_params(&uri, &body) {
        Ok(p) => p,
        Err(err) => return login_error_response(&err),
    };

    if LoginPhase::of(&params) == LoginPhase::Initiate {
        let return_to = canonical_url(&state.config, uri.path(), None);
        let url = state.verifier.redirect_url(&return_to, SSO_REQUIRED, SSO_OPTIONAL, SSO_TEAMS);
        return found_redirect(&url);
    }

    // Callback: verify the assertion from the canonical request URL.
    let response_url = canonical_url(&state.config, uri.path(), uri.query());
    let identity = match state.verifier.verify(&response_url).await {
        Ok(id) => id,
        Err(err) => return login_error_response(&err),
    };
    if identity.nickname.is_empty() {
        return login_error_response(&AuthError::malformed(
            "identity provider did not return a username",
        ));
    }

    // A failed lookup renders the same generic page whether the account is
    // missing or the store is down, so login cannot probe for accounts.
    let user = match state.users.get_user(&identity.nickname).await {
        Ok(u) => u,
        Err(err) => {
            error!("login lookup failed for {}: {}", identity.nickname, err);
            return internal_error_page();
        }
    };
    let role = match Role::from_code(user.role) {
        Ok(r) => r,
        Err(err) => {
            error!("login role check failed for {}: {}", identity.nickname, err);
            return internal_error_page();
        }
    };

    let token = match state.issuer.issue(&identity, role) {
        Ok(t) => t,
        Err(err) => return login_error_response(&err),
    };

    info!("login established for {} ({})", user.username, role);
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&token));
    headers.insert(header::LOCATION, HeaderValue::from_static("/"));
    (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
}

async fn logout(State(state): State<AppState>) -> Response {
    // Best effort: the sentinel token can never verify and the cookie is
    // already expired when it lands. Logout always redirects.
    let sentinel = state.issuer.create_invalid();
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, expired_session_cookie(&sentinel));
    headers.insert(header::LOCATION, HeaderValue::from_static("/"));
    // No bearer credential may ride along on the logout response.
    headers.remove(header::AUTHORIZATION);
    (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
}

async fn register_key(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let claims = match authorize_key_manager(&state, &headers) {
        Ok(c) => c,
        Err(err) => {
            warn!("key registration rejected: {}", err);
            return envelope_or_500(format_standard_response(false, "error-auth", "", err.message()));
        }
    };
    match decode_public_key(body.trim_ascii()) {
        Ok(key) => {
            info!("registered signing key {} for {}", key.key_id, claims.sub);
            envelope_or_500(format_standard_response(true, "", "", ""))
        }
        Err(err) => envelope_or_500(format_standard_response(
            false,
            "error-decode-key",
            err.subcode(),
            &err.to_string(),
        )),
    }
}

/// Require a session token (Bearer header or cookie) whose role may manage
/// signing keys.
fn authorize_key_manager(state: &AppState, headers: &HeaderMap) -> AuthResult<SessionClaims> {
    let token = bearer_or_cookie_token(headers)
        .ok_or_else(|| AuthError::unauthorized("error-auth", "no session token supplied"))?;
    let claims = state.issuer.verify(&token)?;
    let role = Role::from_code(claims.role)
        .map_err(|_| AuthError::unauthorized("error-auth", "session role is not recognised"))?;
    if !role.can_manage_keys() {
        return Err(AuthError::unauthorized(
            "error-auth",
            "signing keys require an admin session",
        ));
    }
    Ok(claims)
}

fn bearer_or_cookie_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Some(token) = value.to_str().ok().and_then(|s| s.strip_prefix("Bearer ")) {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    parse_cookie(headers, SESSION_COOKIE)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: &'static str,
}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo { version: env!("CARGO_PKG_VERSION") })
}

fn found_redirect(url: &str) -> Response {
    match HeaderValue::from_str(url) {
        Ok(location) => {
            let mut headers = HeaderMap::new();
            headers.insert(header::LOCATION, location);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => {
            error!("provider redirect URL is not a valid header value: {}", err);
            internal_error_page()
        }
    }
}

fn login_error_response(err: &AuthError) -> Response {
    if err.conceals_detail() {
        error!("login failed: {}", err);
        return internal_error_page();
    }
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    login_error_page(status, err.message())
}

fn login_error_page(status: StatusCode, message: &str) -> Response {
    let body = format!(
        "<html>\n<head><title>Login Error</title></head>\n<body>{}</body>\n</html>\n",
        escape_html(message)
    );
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    (status, headers, body).into_response()
}

fn internal_error_page() -> Response {
    login_error_page(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn envelope_or_500(result: anyhow::Result<Response>) -> Response {
    result.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn login_phase_is_keyed_off_the_openid_namespace() {
        let mut params = HashMap::new();
        assert_eq!(LoginPhase::of(&params), LoginPhase::Initiate);
        params.insert("openid.ns".to_string(), String::new());
        assert_eq!(LoginPhase::of(&params), LoginPhase::Initiate);
        params.insert("openid.ns".to_string(), "http://specs.openid.net/auth/2.0".to_string());
        assert_eq!(LoginPhase::of(&params), LoginPhase::Callback);
    }

    #[test]
    fn cookie_parsing_picks_the_named_cookie() {
        let headers = headers_with(header::COOKIE, "other=1; serialmint_session=tok.en; x=2");
        assert_eq!(parse_cookie(&headers, SESSION_COOKIE).as_deref(), Some("tok.en"));
        assert_eq!(parse_cookie(&headers, "missing"), None);
        assert_eq!(parse_cookie(&HeaderMap::new(), SESSION_COOKIE), None);
    }

    #[test]
    fn bearer_header_takes_precedence_over_cookie() {
        let mut headers = headers_with(header::AUTHORIZATION, "Bearer from-header");
        headers.insert(header::COOKIE, HeaderValue::from_static("serialmint_session=from-cookie"));
        assert_eq!(bearer_or_cookie_token(&headers).as_deref(), Some("from-header"));

        // Empty bearer value falls through to the cookie
        let mut headers = headers_with(header::AUTHORIZATION, "Bearer ");
        headers.insert(header::COOKIE, HeaderValue::from_static("serialmint_session=from-cookie"));
        assert_eq!(bearer_or_cookie_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn canonical_url_uses_configured_scheme_and_host() {
        let mut config = ServiceConfig::from_env();
        config.url_scheme = "https".to_string();
        config.url_host = "serial.example.com".to_string();
        assert_eq!(canonical_url(&config, "/login", None), "https://serial.example.com/login");
        assert_eq!(
            canonical_url(&config, "/login", Some("a=1&b=2")),
            "https://serial.example.com/login?a=1&b=2"
        );
        assert_eq!(canonical_url(&config, "/login", Some("")), "https://serial.example.com/login");
    }

    #[test]
    fn html_escaping_neutralises_markup() {
        assert_eq!(
            escape_html("<script>alert('x & y')</script>"),
            "&lt;script&gt;alert(&#39;x &amp; y&#39;)&lt;/script&gt;"
        );
    }
}
