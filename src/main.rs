//! Binary entry point for the todo list service.
//!
//! Loads configuration, opens the configured store backend and serves the
//! HTTP API until Ctrl-C.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for startup failures
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use todo_list_service::ServiceConfig;
use todo_list_service::config::BackendKind;
use todo_list_service::http::{self, AppState};
use todo_list_service::observability::{self, LoggingConfig};
use todo_list_service::storage::sqlite::open_connection;
use todo_list_service::storage::ttl::TtlMonitor;
use todo_list_service::storage::{
    ArticleStore, ExpiringCollection, InMemoryArticleStore, InMemoryTodoStore,
    SqliteArticleStore, SqliteTodoStore, TodoItemStore,
};

/// Todo list service - todo items and expiring articles over HTTP.
#[derive(Parser)]
#[command(name = "todo-list-service")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TODO_SERVICE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default).
    Serve {
        /// Port to listen on, overriding configuration.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(LoggingConfig::new(config.log_format, cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let _metrics = match observability::metrics::init(&config.metrics()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize metrics: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Service failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run(cli: Cli, mut config: ServiceConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config = config.with_port(port);
            }
            serve(config).await
        },
    }
}

/// Stores behind the service, with the collection the TTL monitor purges.
struct Stores {
    todos: Arc<dyn TodoItemStore>,
    articles: Arc<dyn ArticleStore>,
    expiring: Arc<dyn ExpiringCollection>,
}

/// Opens the configured backend. Indexes are in place before this returns.
fn open_stores(config: &ServiceConfig) -> anyhow::Result<Stores> {
    match config.backend {
        BackendKind::Memory => {
            let articles = Arc::new(InMemoryArticleStore::new());
            Ok(Stores {
                todos: Arc::new(InMemoryTodoStore::new()),
                articles: Arc::clone(&articles) as Arc<dyn ArticleStore>,
                expiring: articles,
            })
        },
        BackendKind::Sqlite => {
            let path = (!config.use_memory_db).then_some(config.database_path.as_path());
            if let Some(parent) = path.and_then(std::path::Path::parent) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
            let handle = open_connection(path).context("failed to open database")?;
            let todos = SqliteTodoStore::from_handle(Arc::clone(&handle))
                .context("failed to initialize todo store")?;
            let articles = Arc::new(
                SqliteArticleStore::from_handle(handle)
                    .context("failed to initialize article store")?,
            );
            Ok(Stores {
                todos: Arc::new(todos),
                articles: Arc::clone(&articles) as Arc<dyn ArticleStore>,
                expiring: articles,
            })
        },
    }
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    config.validate()?;
    let stores = open_stores(&config)?;
    tracing::info!(
        backend = config.backend.as_str(),
        in_memory = config.use_memory_db,
        "Stores ready"
    );

    let monitor = TtlMonitor::spawn(stores.expiring, config.ttl_monitor_interval);
    let state = AppState::new(stores.todos, stores.articles, &config);

    let result = http::serve(state, &config.bind_address(), shutdown_signal()).await;
    monitor.shutdown().await;
    result.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
