/// Hearth - a small photo-sharing social network backend
///
/// Accounts verified by email OTP, posts with likes and comments, and a
/// follow graph with private accounts and blocking.

mod account;
mod api;
mod auth;
mod config;
mod content;
mod context;
mod db;
mod error;
mod jobs;
mod mailer;
mod otp;
mod rate_limit;
mod relationship;
mod server;
mod validation;

use config::ServerConfig;
use context::AppContext;
use error::AppResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration (reads .env first)
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hearth=debug,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    print_banner();

    // Create application context
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __  __                 __  __
   / / / /__  ____ ______/ /_/ /_
  / /_/ / _ \/ __ `/ ___/ __/ __ \
 / __  /  __/ /_/ / /  / /_/ / / /
/_/ /_/\___/\__,_/_/   \__/_/ /_/

        Hearth v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
