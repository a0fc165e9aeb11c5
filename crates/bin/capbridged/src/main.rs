//! # capbridged: capability bridge daemon
//!
//! Composition root that wires all adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Check the persisted crash window and recover from a crash loop
//! - Load the credential and start the token monitor
//! - Serve the push channel (OAuth callback, webhook) before discovery so a
//!   missing credential can be granted while the process is running
//! - Discover devices, register their synchronizers and start polling
//! - Handle graceful shutdown (Ctrl-C)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod reauth;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use capbridge_adapter_accessory::AccessoryFactory;
use capbridge_adapter_http_axum::state::AppState;
use capbridge_adapter_platform_reqwest::PlatformClient;
use capbridge_adapter_storage_sqlite_sqlx::{SqliteCrashRepository, SqliteTokenRepository};
use capbridge_app::services::authorized_gateway::AuthorizedGateway;
use capbridge_app::services::capability_resolver::CapabilityResolver;
use capbridge_app::services::crash_loop::CrashLoopManager;
use capbridge_app::services::discovery::DiscoveryService;
use capbridge_app::services::event_router::EventRouter;
use capbridge_app::services::token_store::TokenStore;
use capbridge_domain::crash::CrashKind;

use crate::config::Config;
use crate::reauth::LogReauthenticator;

type Tokens = TokenStore<PlatformClient, SqliteTokenRepository, LogReauthenticator>;
type Gateway = AuthorizedGateway<PlatformClient, SqliteTokenRepository, LogReauthenticator>;
type Crashes = CrashLoopManager<SqliteCrashRepository>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Database
    let db = capbridge_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    let crashes = CrashLoopManager::load(
        SqliteCrashRepository::new(pool.clone()),
        config.crash_loop.clone(),
    )
    .await
    .context("failed to load crash window")?;

    // Credential
    let platform = PlatformClient::new(config.platform.clone())?;
    let authorize_url = platform.config().authorize_url()?;
    let tokens = match TokenStore::initialize(
        platform,
        SqliteTokenRepository::new(pool),
        LogReauthenticator::new(authorize_url.as_str()),
        config.token_policy(),
        config.bootstrap_token()?,
    )
    .await
    {
        Ok(tokens) => Arc::new(tokens),
        Err(err) => {
            record(&crashes, CrashKind::Initialization).await;
            return Err(err).context("failed to load credential");
        }
    };

    if let Err(err) = crashes.evaluate_and_recover(&*tokens).await {
        tracing::error!(error = %err, "recovered from crash loop, waiting for authorization");
    }

    // Push channel
    let router: Arc<EventRouter<Gateway>> = Arc::new(EventRouter::new());
    let app = capbridge_adapter_http_axum::router::build(AppState::new(
        Arc::clone(&tokens),
        Arc::clone(&router),
    ));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, "capbridged listening");
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let monitor = tokens.run_monitor();

    let pollers = tokio::select! {
        started = start_bridge(&config, &tokens, &crashes, &router) => started,
        joined = &mut server => {
            monitor.abort();
            joined??;
            return Ok(());
        }
    };
    let pollers = match pollers {
        Ok(pollers) => pollers,
        Err(err) => {
            monitor.abort();
            server.abort();
            return Err(err);
        }
    };

    let served = server.await;
    monitor.abort();
    for poller in pollers {
        poller.abort();
    }
    served??;
    tracing::info!("capbridged stopped");
    Ok(())
}

/// Wait for a credential, then discover devices and start polling them.
async fn start_bridge(
    config: &Config,
    tokens: &Arc<Tokens>,
    crashes: &Crashes,
    router: &EventRouter<Gateway>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let mut current = tokens.subscribe();
    if current.borrow().is_none() {
        tracing::info!("waiting for authorization before discovery");
    }
    current
        .wait_for(Option::is_some)
        .await
        .context("token store dropped")?;

    if let Err(err) = tokens.access_token().await {
        record(crashes, CrashKind::Authentication).await;
        return Err(err).context("credential rejected at startup");
    }

    let discovery = DiscoveryService::new(
        Arc::clone(tokens),
        CapabilityResolver::new(config.resolver.clone()),
        config.discovery.clone(),
        config.polling_plan(),
    );
    let factory: AccessoryFactory<Gateway> = AccessoryFactory::new();
    let synchronizers = discovery
        .discover(&factory, crashes)
        .await
        .context("device discovery failed")?;

    let pollers = synchronizers
        .iter()
        .map(|synchronizer| {
            router.register(Arc::clone(synchronizer));
            synchronizer.start_polling()
        })
        .collect();
    for accessory in factory.accessories() {
        tracing::info!(
            name = accessory.name(),
            service = accessory.service_name(),
            device_id = %accessory.device_id(),
            "accessory published"
        );
    }
    tracing::info!(
        devices = synchronizers.len(),
        accessories = factory.accessories().len(),
        "bridge started"
    );
    Ok(pollers)
}

async fn record(crashes: &Crashes, kind: CrashKind) {
    if let Err(err) = crashes.record_potential_crash(kind).await {
        tracing::error!(error = %err, %kind, "failed to record crash");
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
