use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use family_hub::api::{self, SecurityConfig};
use family_hub::db::Database;
use family_hub::FamilyHub;

#[derive(Parser)]
#[command(name = "familyhub")]
#[command(about = "Household management: family members, tasks and a shared shopping list")]
struct Cli {
    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "FAMILYHUB_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000", env = "FAMILYHUB_PORT")]
        port: u16,

        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "family_hub=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate().await?;
    Ok(db)
}

async fn serve(db: Database, bind: &str, port: u16) -> anyhow::Result<()> {
    let hub = FamilyHub::builder(db).build();
    let app = api::create_router_with_config(hub, SecurityConfig::from_env());

    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("FamilyHub server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port, bind }) => {
            tracing::info!("Starting FamilyHub server on port {}", port);
            let db = open_database(cli.database).await?;
            serve(db, &bind, port).await?;
        }
        Some(Commands::Migrate) => {
            open_database(cli.database).await?;
            tracing::info!("Database is up to date");
        }
        None => {
            // Default: start server
            tracing::info!("Starting FamilyHub server on port 3000");
            let db = open_database(cli.database).await?;
            serve(db, "127.0.0.1", 3000).await?;
        }
    }

    Ok(())
}
