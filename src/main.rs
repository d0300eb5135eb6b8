use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use ehr_core::{constants::DEFAULT_REST_ADDR, EhrServices, ServiceConfig};
use node_client::{NodeCapabilities, NodeClient};

/// Main entry point for the EHR consent broker
///
/// Serves the client, external and push APIs, and runs the background tasks:
/// - the event poller, when `EHR_EVENT_POLL_SECS` is non-zero
/// - the access-log listener that pushes new audit entries to watching clients
///
/// # Environment Variables
/// - `EHR_REST_ADDR`: REST and WebSocket address (default: "0.0.0.0:3000")
/// - `EHR_ORGANISATION_AGB`: AGB code of this organisation (required)
/// - `EHR_ORGANISATION_NAME`: display name (default: "Demo EHR")
/// - `NUTS_NODE_URL`: consent node base URL (default: "http://localhost:1323")
/// - `NUTS_NODE_TIMEOUT_MS`: per-request node timeout
/// - `EHR_SEED_FILE`: YAML patient seed; built-in demo patients otherwise
/// - `EHR_REQUIRE_IDENTITY_CONTRACT`: require `X-Identity-Contract` on external requests
///
/// # Returns
/// * `Ok(())` - If the server shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ehr_run=info".parse()?)
                .add_directive("ehr_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("EHR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = ServiceConfig::from_env()?;
    tracing::info!("++ Starting EHR for {} ({})", cfg.organisation_name(), cfg.organisation_urn());
    tracing::info!("++ Starting EHR REST on {}", rest_addr);
    tracing::info!("++ Using consent node at {}", cfg.node_url());

    let node = NodeClient::new(cfg.node_url(), cfg.node_timeout())?;
    let services = EhrServices::build(cfg, NodeCapabilities::from_client(node))?;

    if let Err(e) = services.relay.refresh_all().await {
        tracing::warn!("initial view refresh failed: {}", e);
    }
    let background = services.spawn_background();

    let app = router(AppState::new(services));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("++ Shutting down background tasks");
    for task in background {
        task.abort();
    }

    Ok(())
}
