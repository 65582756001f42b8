// Burst relay between the simulator's burst engine and a front-end client.

use tokio::sync::watch;
use tracing::{error, info, warn};

use burst_relay_server::app::{AppState, RelayShared, RelayStatus};
use burst_relay_server::config::RelayConfig;
use burst_relay_server::control::ControlClient;
use burst_relay_server::http;
use burst_relay_server::registration;
use burst_relay_server::relay::RelayLoop;
use burst_relay_server::transport::ChannelPair;
use burst_relay_server::utils::wait_for_shutdown;
use relay_core::cadence::CadenceTracker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RelayConfig::from_env();
    info!(api_url = %config.api_url, agent_id = %config.agent_id, "connecting to simulator");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("stop signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                warn!(?err, "failed to listen for stop signal");
                std::future::pending::<()>().await;
            }
        }
    });

    let Some(registration) = registration::register_until_ready(&config, shutdown_rx.clone()).await
    else {
        info!("stopped before registration completed");
        return;
    };

    let channels =
        match ChannelPair::open(registration.outbound.clone(), registration.inbound.clone()).await {
            Ok(channels) => channels,
            Err(err) => {
                error!(%err, "failed to open simulator channels");
                std::process::exit(1);
            }
        };
    info!(
        outbound = %channels.outbound_address(),
        inbound = %channels.inbound_address(),
        "simulator channels open"
    );
    if let Some(capabilities) = config.capabilities.as_ref() {
        if let Err(err) = channels.publish(capabilities) {
            warn!(%err, "failed to publish capabilities");
        }
    }

    let control = ControlClient::new(
        registration.control_base.clone(),
        Some(registration.network_url.clone()),
    );
    let tracker = CadenceTracker::new(registration.burst_period, registration.burst_counter);
    let shared = RelayShared::new(RelayStatus::new(&tracker, registration.burst_counter));

    let relay = RelayLoop::new(
        channels,
        control,
        tracker,
        registration.burst_counter,
        shared.clone(),
    );
    let relay_handle = tokio::spawn(relay.run(shutdown_rx.clone()));

    let app = http::router(AppState::new(shared, shutdown_rx.clone()));

    let addr = config.http_addr;
    let mut server_shutdown = shutdown_rx.clone();
    info!(%addr, "starting front-end bridge");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut server_shutdown).await })
        .await
        .expect("server failed");

    if let Err(err) = relay_handle.await {
        warn!(?err, "relay task ended abnormally");
    }
    info!("relay stopped");
}
