//! Rearm binary - composition root.
//!
//! 1. Load configuration and install logging
//! 2. Open the SQLite database (records + delay queue)
//! 3. Build the actuator connector, reconciler and queue worker
//! 4. Serve the skill and registration API until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use rearm_action::{
    ActuatorConnector, ConnectionCache, QueueWorker, Reconciler, Registrar, RetryPolicy,
    Scheduler, SessionFactory, SimulatedVendor, WorkerSettings,
};
use rearm_api::{auth, AppState};
use rearm_core::config::RearmConfig;
use rearm_core::error::RearmError;
use rearm_core::types::CredentialRole;
use rearm_skill::{parse_duration_secs, SkillRouter, SkillServices};
use rearm_storage::{Database, EventStore, QueueSettings, SqliteDelayQueue, SqliteRecordStore};

use cli::{CliArgs, Command};

/// Credential slot used by both the skill and the queue worker.
const CREDENTIAL_ROLE: CredentialRole = CredentialRole::Listener;

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn session_factory(config: &RearmConfig) -> Result<Arc<dyn SessionFactory>, RearmError> {
    match config.actuator.kind.as_str() {
        "simulated" => Ok(Arc::new(SimulatedVendor::new(config.actuator.initial_mode))),
        other => Err(RearmError::Config(format!(
            "Unsupported actuator kind: {}",
            other
        ))),
    }
}

async fn serve(
    args: &CliArgs,
    config: RearmConfig,
    data_dir: &Path,
    db: Arc<Database>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = EventStore::new(Arc::new(SqliteRecordStore::new(Arc::clone(&db))));
    let queue = Arc::new(SqliteDelayQueue::new(
        Arc::clone(&db),
        QueueSettings::from(&config.queue),
    ));
    match queue.pending_count() {
        Ok(pending) => info!(pending, "Delay queue opened"),
        Err(e) => error!(error = %e, "Failed to count pending messages"),
    }

    let connector = Arc::new(ActuatorConnector::new(
        store.clone(),
        CREDENTIAL_ROLE,
        session_factory(&config)?,
        Arc::new(ConnectionCache::new()),
        config.skill.control_center_name.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        connector.clone(),
        RetryPolicy::from(&config.retry),
    ));
    let worker = Arc::new(QueueWorker::new(
        queue.clone(),
        reconciler,
        WorkerSettings::from(&config.queue),
    ));

    let registrar = Registrar::new(store.clone(), CREDENTIAL_ROLE);
    let services = SkillServices {
        scheduler: Scheduler::new(store.clone(), queue),
        registrar: registrar.clone(),
        actuators: connector,
        default_delay_secs: parse_duration_secs(&config.skill.default_delay)?,
    };

    let api_token = auth::load_or_generate_token(&data_dir.join("api_token"));
    let port = args.resolve_port(config.general.port);
    let state = AppState::new(config, SkillRouter::new(services), registrar, store, api_token)
        .with_port(port);

    let worker_task = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };
    let served = rearm_api::start_server(state, shutdown).await;

    worker.shutdown();
    if let Err(e) = worker_task.await {
        error!(error = %e, "Queue worker task failed");
    }
    served?;
    info!("Rearm stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = RearmConfig::load_or_default(&config_file);
    let rust_log = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    init_tracing(&args.resolve_log_filter(rust_log.as_deref(), &config.general.log_level));
    info!(
        path = %config_file.display(),
        "Starting Rearm v{}",
        env!("CARGO_PKG_VERSION")
    );

    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("rearm.db");
    let db = Arc::new(Database::new(&db_path)?);

    let registrar = || {
        let store = EventStore::new(Arc::new(SqliteRecordStore::new(Arc::clone(&db))));
        Registrar::new(store, CREDENTIAL_ROLE)
    };

    match args.command() {
        Command::Serve => serve(&args, config, &data_dir, Arc::clone(&db)).await?,
        Command::Register { user_id, token } => {
            registrar().complete(&user_id, &token).await?;
            println!("Registered {}", user_id);
        }
        Command::Pending { user_id } => {
            let code = registrar().begin(&user_id).await?;
            println!("Register code for {}: {}", user_id, code);
        }
        Command::Users => {
            for user_id in registrar().list_user_ids().await? {
                println!("{}", user_id);
            }
        }
    }
    Ok(())
}
