use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use serialmint::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let config = ServiceConfig::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "serialmint",
        "serialmint starting: RUST_LOG='{}', http_port={}, sso_endpoint='{}', base_url='{}'",
        rust_log,
        config.http_port,
        config.sso_endpoint,
        config.base_url()
    );
    if config.jwt_secret.is_empty() {
        warn!("SERIALMINT_JWT_SECRET is not set; logins will fail until a secret is configured");
    }

    serialmint::server::run(config).await
}
