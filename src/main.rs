use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use helios::{Helios, HeliosConfig};

mod handlers;

#[derive(Parser)]
#[command(name = "helios")]
#[command(about = "Helios demo server - a notes API built on the Helios toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Migrate the database and serve the API (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides HELIOS_PORT / PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Migrate every registered model and exit")]
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up HELIOS_SECRET, DATABASE_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = HeliosConfig::from_env();
    tracing::info!("Starting Helios in {:?} mode", config.environment);

    let mut app = Helios::new(config).context("invalid session configuration")?;
    handlers::register_models(&mut app);
    app.initialize()
        .await
        .context("failed to open the database")?;
    app.migrate().await.context("failed to migrate models")?;

    let result = match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(&app, port).await,
        Commands::Migrate => {
            tracing::info!("Migrated {} models", app.models().len());
            Ok(())
        }
    };

    app.close_db().await;
    result
}

async fn serve(app: &Helios, port: Option<u16>) -> anyhow::Result<()> {
    let router = handlers::routes(app)?.layer(TraceLayer::new_for_http());

    let port = port.unwrap_or(app.config().server.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Helios listening on http://{}", bind_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
