//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST and push API on its own, without the event poller.
//!
//! ## Intended use
//! Useful for development when the node delivers events through the `/events/notify` webhook.
//! The workspace's main `ehr-run` binary also runs the poller.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use ehr_core::{constants::DEFAULT_REST_ADDR, EhrServices, ServiceConfig};
use node_client::{NodeCapabilities, NodeClient};

/// Main entry point for the EHR REST API server
///
/// # Environment Variables
/// - `EHR_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - everything `ServiceConfig::from_env` reads
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the seed file cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("EHR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    tracing::info!("-- Starting EHR REST API on {}", addr);

    let cfg = ServiceConfig::from_env()?;
    let node = NodeClient::new(cfg.node_url(), cfg.node_timeout())?;
    tracing::info!(
        "-- {} ({}) using node at {}",
        cfg.organisation_name(),
        cfg.organisation_urn(),
        cfg.node_url()
    );

    let services = EhrServices::build(cfg, NodeCapabilities::from_client(node))?;
    services
        .relay
        .clone()
        .spawn_access_log_listener(services.access_log.subscribe_stored());
    if let Err(e) = services.relay.refresh_all().await {
        tracing::warn!("initial view refresh failed: {}", e);
    }

    let app = router(AppState::new(services));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
