//! `skein-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::Result;

use skein_api::config::Config;
use skein_api::server::Server;
use skein_core::observability::{LogFormat, init_logging};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(choose_log_format(&config));

    if config.debug {
        tracing::warn!("SKEIN_DEBUG=true; ephemeral secrets allowed, do not use in production");
    }
    tracing::info!("Using in-memory entity store");

    let server = Server::new(config);
    server.serve().await?;
    Ok(())
}
