//! fundsflow - funds transfer service
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌────────────┐    ┌──────────┐
//! │ Gateway  │───▶│ Coordinator │───▶│ Authorizer │    │ Notifier │
//! │  (HTTP)  │    │ (lock+tx)   │    └────────────┘    └────▲─────┘
//! └──────────┘    └──────┬──────┘                          │
//!                        │ commit    ┌────────────┐   ┌────┴─────┐
//!                        └──────────▶│ Dispatcher │──▶│  Engine  │
//!                                    └────────────┘   │ (retry)  │
//!                                                     └──────────┘
//! ```
//!
//! Usage:
//!
//! ```text
//! fundsflow [--env dev] [--port 8080] [--standalone]
//! ```
//!
//! `--standalone` runs on the in-memory store seeded from `demo_accounts`;
//! otherwise `postgres_url` must be configured.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};

use fundsflow::account::{AccountStore, PgAccountStore};
use fundsflow::authorizer::build_authorizer;
use fundsflow::cache::ReadCache;
use fundsflow::config::AppConfig;
use fundsflow::db::Database;
use fundsflow::gateway::{self, state::AppState};
use fundsflow::memory::MemoryStore;
use fundsflow::notification::{
    DeliveryConfig, DeliveryEngine, HttpNotifier, NotificationDispatcher, NotificationStore,
    PgNotificationStore,
};
use fundsflow::transfer::{PgTransferStore, TransferCoordinator, TransferStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_standalone_mode() -> bool {
    std::env::args().any(|a| a == "--standalone")
}

/// Storage backends behind the core's trait seams
struct Stores {
    accounts: Arc<dyn AccountStore>,
    transfers: Arc<dyn TransferStore>,
    notifications: Arc<dyn NotificationStore>,
    database: Option<Database>,
}

fn standalone_stores(config: &AppConfig) -> Stores {
    let store = Arc::new(MemoryStore::new());
    for demo in &config.demo_accounts {
        let id = store.seed_account(&demo.name, &demo.email, demo.role, demo.balance);
        tracing::info!(account_id = %id, name = %demo.name, role = %demo.role, "Seeded account");
    }

    Stores {
        accounts: store.clone(),
        transfers: store.clone(),
        notifications: store,
        database: None,
    }
}

async fn postgres_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let Some(url) = config.postgres_url.as_deref() else {
        bail!("postgres_url is not configured; set it or run with --standalone");
    };

    let database = Database::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    database
        .health_check()
        .await
        .context("PostgreSQL health check failed")?;
    tracing::info!("PostgreSQL connected");

    let pool = database.pool().clone();
    Ok(Stores {
        accounts: Arc::new(PgAccountStore::new(pool.clone())),
        transfers: Arc::new(PgTransferStore::new(pool.clone())),
        notifications: Arc::new(PgNotificationStore::new(pool)),
        database: Some(database),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = fundsflow::logging::init_logging(&app_config);

    let standalone = use_standalone_mode();
    tracing::info!(
        env = %env,
        storage = if standalone { "standalone" } else { "postgres" },
        "Starting fundsflow"
    );

    let stores = if standalone {
        standalone_stores(&app_config)
    } else {
        postgres_stores(&app_config).await?
    };

    let authorizer = build_authorizer(&app_config.authorizer)?;
    let notifier = Arc::new(HttpNotifier::new(&app_config.notifier)?);
    let cache = Arc::new(ReadCache::new(Duration::from_secs(
        app_config.cache.ttl_secs,
    )));

    let (dispatcher, jobs) =
        NotificationDispatcher::new(stores.notifications.clone(), app_config.notifier.queue_size);
    let dispatcher = Arc::new(dispatcher.with_max_attempts(app_config.notifier.max_attempts));

    let engine = Arc::new(DeliveryEngine::new(
        stores.notifications.clone(),
        stores.accounts.clone(),
        notifier,
        DeliveryConfig {
            policy: app_config.notifier.retry_policy(),
            scan_interval: app_config.notifier.recovery_scan_interval(),
            ..DeliveryConfig::default()
        },
        dispatcher.sender(),
    ));
    match engine.resume_pending().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "Resumed pending notifications"),
        Err(e) => tracing::error!(error = %e, "Failed to resume pending notifications"),
    }
    tokio::spawn(engine.clone().run_recovery());
    tokio::spawn(engine.run(jobs));

    let coordinator = Arc::new(
        TransferCoordinator::new(
            stores.transfers,
            authorizer,
            dispatcher.clone(),
            cache.clone(),
        )
        .with_max_amount(app_config.transfer.max_amount),
    );

    let state = Arc::new(AppState::new(
        coordinator,
        stores.accounts,
        dispatcher,
        cache,
        stores.database,
    ));

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(state, &app_config.gateway.host, port).await
}
