//! GoalPro API server binary.

use std::sync::Arc;

use clap::Parser;
use goalpro_api::config::ApiConfig;
use goalpro_core::mailer::{HttpMailer, LogMailer, Mailer};
use goalpro_core::store::PgStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "goalpro_api_server", about = "GoalPro API server")]
struct Args {
    /// Port to listen on. Overrides the port of `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/goalpro"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,goalpro_api=debug,goalpro_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    // A missing production secret stops the process before anything listens.
    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }

    info!(
        environment = ?config.environment,
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting goalpro_api_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    // Run database migrations.
    info!("running database migrations");
    goalpro_api::migrate(&pool).await?;

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(
            mail.api_url.clone(),
            mail.api_key.clone(),
            mail.from.clone(),
            config.mail_timeout,
        )?),
        None => {
            if config.environment.is_production() {
                warn!("mail API not configured; password reset mails will only be logged");
            }
            Arc::new(LogMailer)
        }
    };

    let store = Arc::new(PgStore::new(pool));
    let bind_addr = config.bind_addr.clone();
    let state = goalpro_api::AppState::new(store, mailer, config)?;
    let app = goalpro_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
