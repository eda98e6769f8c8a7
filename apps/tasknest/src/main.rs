//! # TaskNest
//!
//! Entry point: parses the command line, installs logging and dispatches.

use clap::Parser;
use std::process::ExitCode;
use tasknest::api::{self, AppState};
use tasknest::cli::{self, Cli, CliError, CliResult, Command, UserCommand};
use tasknest::config::Settings;
use tasknest_core::{Nest, TokenCodec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("✗ Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> CliResult<()> {
    match command {
        Command::Serve {
            host,
            port,
            db,
            backend,
        } => {
            let mut settings = Settings::from_env()?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            settings.database = db.path;
            serve(settings, backend).await
        }
        Command::Init { db, force } => cli::cmd_init(&db.path, force),
        Command::Status { db, json } => cli::cmd_status(&db.path, json).map(drop),
        Command::User {
            command:
                UserCommand::Add {
                    email,
                    password,
                    db,
                    iterations,
                },
        } => cli::cmd_user_add(&db.path, &email, &password, iterations).map(drop),
        Command::Todo { command } => cli::run_todo(command),
    }
}

async fn serve(settings: Settings, backend: cli::Backend) -> CliResult<()> {
    let store = cli::open_store(&settings.database, backend)?;
    let nest = Nest::new(
        store,
        TokenCodec::new(&settings.jwt_secret),
        settings.nest_config(),
    );

    let addr = format!("{}:{}", settings.host, settings.port);
    tracing::info!(
        %addr,
        environment = settings.environment.as_str(),
        debug = settings.debug(),
        backend = ?backend,
        database = %settings.database.display(),
        "starting TaskNest server"
    );

    let app = api::router(AppState::new(nest, settings));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::Server(e.to_string()))?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
