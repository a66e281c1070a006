use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use treasures::{
    auth::{self, NewPrincipal},
    config::Config,
    db, AppState,
};

/// Treasures API server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve,

    /// Create a staff superuser.
    Createsuperuser {
        email: String,
        password: String,
        handle: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,treasures=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db_pool = db::connect(&config)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db_pool).await,
        Command::Createsuperuser { email, password, handle } => {
            create_superuser(&config, &db_pool, &email, &password, handle.as_deref()).await
        }
    }
}

async fn serve(config: Config, db_pool: sqlx::SqlitePool) -> anyhow::Result<()> {
    let http_addr = config.http_addr;
    let app = treasures::app(AppState::new(config, db_pool));

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(%http_addr, version = env!("CARGO_PKG_VERSION"), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn create_superuser(
    config: &Config,
    db_pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
    handle: Option<&str>,
) -> anyhow::Result<()> {
    let Some(email) = auth::normalize_email(email) else {
        bail!("{email:?} is not a valid email address");
    };
    let handle = auth::normalize_handle(handle);
    let violations = config.password_policy.violations(password, &email, handle.as_deref());
    if !violations.is_empty() {
        bail!("password rejected: {}", violations.join(" "));
    }

    let principal = auth::create_principal(
        db_pool,
        config.password_policy,
        NewPrincipal {
            email: &email,
            handle: handle.as_deref(),
            password,
            is_staff: true,
            is_superuser: true,
        },
    )
    .await
    .map_err(|err| anyhow::anyhow!("could not create superuser: {err}"))?;

    println!("created superuser {} ({})", principal.email, principal.id);
    Ok(())
}
