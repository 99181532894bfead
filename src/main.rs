//! Round coordinator binary entrypoint wiring the bus, gateway, consumers and REST layers.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use round_coordinator::{
    bus::{MessageBus, memory::InMemoryBus},
    config::{AppConfig, DirectoryConfig},
    dao::round_store::memory::InMemoryRoundStore,
    gateway::{
        ROLE_LOOKUP_ROUTE, RequestGateway, TAG_NUMBER_ROUTE,
        lookups::GatewayLookups,
        pending::spawn_sweeper,
        responder::{Directory, serve_lookups},
    },
    routes,
    scheduler::BusScheduler,
    services::consumers,
    state::{AppState, Dependencies, SharedState, clock::SystemClock},
};

/// How often unused per-round lock entries are dropped.
const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let bus = InMemoryBus::with_redelivery(config.redelivery);
    let bus_handle: Arc<dyn MessageBus> = Arc::new(bus.clone());

    if let Some(directory) = &config.directory {
        start_demo_directory(bus_handle.clone(), directory).await?;
    }

    let gateway = RequestGateway::new(bus_handle.clone(), config.gateway_timeout);
    let lookups = Arc::new(GatewayLookups::new(gateway.clone()));
    spawn_sweeper(gateway.pending(), config.sweep_interval);

    let port = config.port;
    let app_state = AppState::new(
        config,
        Dependencies {
            store: Arc::new(InMemoryRoundStore::new()),
            bus: bus_handle.clone(),
            scheduler: Arc::new(BusScheduler::new(bus_handle)),
            tags: lookups.clone(),
            roles: lookups,
            clock: Arc::new(SystemClock),
        },
    );

    consumers::spawn_consumers(app_state.clone())
        .await
        .context("subscribing round consumers")?;
    tokio::spawn(prune_round_locks(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    bus.close();
    Ok(())
}

/// Answer tag and role lookups in-process from the configured directory.
async fn start_demo_directory(
    bus: Arc<dyn MessageBus>,
    directory: &DirectoryConfig,
) -> anyhow::Result<()> {
    let tags: Directory<_> = Arc::new(
        directory
            .tags
            .iter()
            .map(|(user, tag)| (user.as_str().into(), *tag))
            .collect::<DashMap<_, _>>(),
    );
    let roles: Directory<_> = Arc::new(
        directory
            .roles
            .iter()
            .map(|(user, role)| (user.as_str().into(), *role))
            .collect::<DashMap<_, _>>(),
    );

    serve_lookups(bus.clone(), TAG_NUMBER_ROUTE, tags)
        .await
        .context("starting tag responder")?;
    serve_lookups(bus, ROLE_LOOKUP_ROUTE, roles)
        .await
        .context("starting role responder")?;
    info!(
        tags = directory.tags.len(),
        roles = directory.roles.len(),
        "serving demo lookup directory"
    );
    Ok(())
}

/// Periodically drop lock entries of rounds nobody is working on.
async fn prune_round_locks(state: SharedState) {
    let mut ticker = tokio::time::interval(LOCK_PRUNE_INTERVAL);
    loop {
        ticker.tick().await;
        let pruned = state.locks().prune();
        if pruned > 0 {
            debug!(pruned, "pruned idle round locks");
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
