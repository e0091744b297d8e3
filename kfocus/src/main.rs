use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kfocus::api::{create_router, AppState};
use kfocus::config::Config;
use kfocus::db::{Database, LibSqlBackend, MetaStore};
use kfocus::events::EventBus;
use kfocus::gateway::ModelGateway;
use kfocus::modelhost::ModelHostSupervisor;
use kfocus::scheduler::TaskScheduler;
use kfocus::vector::VectorStore;

#[derive(Parser)]
#[command(name = "kfocus")]
#[command(about = "Local knowledge-management core: tagging, chunking, hybrid retrieval")]
struct Args {
    /// HTTP port (default 60315)
    #[arg(long)]
    port: Option<u16>,

    /// Bind host (default 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// SQLite database path (default <data_dir>/knowledge-focus.db)
    #[arg(long)]
    db_path: Option<std::path::PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("kfocus failed to start: {error:#}");
            ExitCode::from(2)
        }
    }
}

#[tokio::main]
async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    // The event channel claims stdout before anything else can write to
    // it; logs go to stderr and the daily log file.
    let events = EventBus::to_stdout();

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(db_path) = args.db_path {
        config.storage.db_path = Some(db_path);
    }

    std::fs::create_dir_all(&config.storage.data_dir)?;
    std::fs::create_dir_all(config.log_dir())?;
    init_logging(&config)?;

    tracing::info!("Initializing metadata database...");
    let database = Database::open(&config.db_path()).await?;
    let store: Arc<dyn MetaStore> = Arc::new(LibSqlBackend::new(database));

    tracing::info!(
        dimensions = config.embeddings.dimensions,
        "Initializing vector store..."
    );
    let vectors = VectorStore::open(&config.vector_db_path(), config.embeddings.dimensions).await?;

    let gateway = ModelGateway::new(store.clone(), config.embeddings.dimensions);
    let state = AppState::new(
        config.clone(),
        store.clone(),
        vectors,
        gateway.clone(),
        events.clone(),
    );

    let cancel_token = CancellationToken::new();

    let scheduler = Arc::new(TaskScheduler::new(
        store.clone(),
        gateway,
        state.tagging.clone(),
        state.chunking.clone(),
        events.clone(),
        &config,
    ));
    let swept = scheduler.startup_sweep().await?;
    if swept > 0 {
        tracing::info!(swept, "Recovered tasks from a previous run");
    }
    let worker_handles = scheduler.spawn_workers(cancel_token.clone());

    let model_host =
        ModelHostSupervisor::new(config.model_host.clone(), events.clone()).spawn(cancel_token.child_token());

    spawn_parent_monitor(cancel_token.clone());

    let app = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("kfocus starting on http://{addr}");
    tracing::info!("  Health check: http://{addr}/health");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    events.system_status("ready", "service started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
        .await?;

    // Give workers a bounded window to finish their current task.
    let joins = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = model_host.await;
    };
    if tokio::time::timeout(std::time::Duration::from_secs(5), joins)
        .await
        .is_err()
    {
        tracing::warn!("Workers did not stop within the shutdown budget");
    }

    events.system_status("stopped", "service shut down");
    Ok(())
}

/// When launched as a sidecar (`KFOCUS_MONITOR_PARENT=1`), the parent
/// holds our stdin open; EOF means the parent died and we must not
/// outlive it. Opt-in, because standalone runs may have a closed stdin.
fn spawn_parent_monitor(cancel_token: CancellationToken) {
    let enabled = std::env::var("KFOCUS_MONITOR_PARENT")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if !enabled {
        return;
    }

    tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut stdin = tokio::io::stdin();
        let mut buffer = [0u8; 256];
        loop {
            match stdin.read(&mut buffer).await {
                Ok(0) | Err(_) => {
                    tracing::warn!("Parent process gone (stdin closed), shutting down");
                    cancel_token.cancel();
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    std::process::exit(0);
                }
                Ok(_) => {}
            }
        }
    });
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let log_name = format!("api_{}.log", chrono::Local::now().format("%Y%m%d"));
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir().join(log_name))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kfocus=info,tower_http=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
        .init();
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel_token.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    cancel_token.cancel();
}
