use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use nexops::cluster::{ClusterClient, ProxmoxClient};
use nexops::db::schema::ensure_schema;
use nexops::health::{HealthChecker, UrlGuard};
use nexops::reconciliation::InfrastructureSyncService;
use nexops::server::config::ServerConfig;
use nexops::server::scheduler::ScheduledTask;
use nexops::telemetry::MetricsCollector;
use nexops::version::VERSION;
use nexops::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Handle};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting server, version: {}", VERSION);

    // Background jobs get their own runtime so slow cluster calls never starve request handling.
    let mut worker_builder = Builder::new_multi_thread();
    worker_builder.enable_all().thread_name("nexops-worker");
    if let Some(threads) = config.worker_threads {
        worker_builder.worker_threads(threads.max(1));
    }
    let worker = worker_builder.build()?;

    let api = Builder::new_multi_thread()
        .enable_all()
        .thread_name("nexops-api")
        .build()?;

    let result = api.block_on(run(config, worker.handle().clone()));
    if let Err(e) = &result {
        error!(error = %e, "Server exited with an error.");
    }
    worker.shutdown_background();
    result
}

async fn connect(database_url: &str) -> Result<DatabaseConnection, BoxError> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;
    info!("Database connected and schema ensured.");
    Ok(db)
}

async fn run(config: ServerConfig, worker: Handle) -> Result<(), BoxError> {
    let db = connect(&config.database_url).await?;
    let cluster: Arc<dyn ClusterClient> = Arc::new(ProxmoxClient::new(config.proxmox()));

    let sync_task = ScheduledTask::new(
        Arc::new(InfrastructureSyncService::new(db.clone(), cluster.clone())),
        config.sync_schedule(),
    );
    let metrics_task = ScheduledTask::new(
        Arc::new(MetricsCollector::new(db.clone(), cluster.clone())),
        config.metrics_schedule(),
    );
    let health_task = ScheduledTask::new(
        Arc::new(HealthChecker::new(db.clone(), UrlGuard::default())?),
        config.health_schedule(),
    );

    let job_handles = [
        sync_task.spawn_periodic(&worker),
        metrics_task.spawn_periodic(&worker),
        health_task.spawn_periodic(&worker),
    ];

    let app_state = Arc::new(AppState {
        db_pool: db,
        cluster,
        sync_task,
        worker,
    });
    let router = create_axum_router(app_state, &config.cors_origins);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP API listening.");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in job_handles {
        handle.abort();
    }
    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
