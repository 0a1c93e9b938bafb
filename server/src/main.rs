mod activity;
mod config;
mod graphql;
mod http;

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_db::{DatabaseSettings, DbPool, SeaOrmDealStore, connect};
use platform_obs::{ObsConfig, init_tracing};
use products_pipeline::{
    ChannelAuditSink, DealStore, FanoutAuditSink, InMemoryDealStore, PipelineEngine,
    TracingAuditSink,
};
use tracing::{info, warn};

use crate::{
    activity::ActivityFeed,
    config::{AppConfig, StoreKind},
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "pipeline-server", version, about = "Deal pipeline stage engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(ObsConfig::from_env("pipeline-server"))?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => {
            let config = Arc::new(AppConfig::load()?);
            run_server(cmd, config).await
        }
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
    }
}

async fn setup_pool() -> Result<DbPool> {
    let settings = DatabaseSettings::from_env()?;
    connect(&settings).await.map_err(Into::into)
}

async fn build_store(cmd: &ServeCommand, config: &AppConfig) -> Result<Arc<dyn DealStore>> {
    match config.store {
        StoreKind::Memory => {
            warn!("using the in-memory deal store; data is lost on restart");
            Ok(Arc::new(InMemoryDealStore::new()))
        }
        StoreKind::Postgres => {
            let pool = setup_pool().await?;
            ensure_migrations(&pool, cmd.allow_dirty).await?;
            Ok(Arc::new(SeaOrmDealStore::new(pool)))
        }
    }
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let store = build_store(&cmd, &config).await?;
    let (channel, activity_rx) = ChannelAuditSink::new();
    let feed = ActivityFeed::default();
    feed.spawn(activity_rx);
    let audit = FanoutAuditSink::default()
        .with(Arc::new(TracingAuditSink))
        .with(Arc::new(channel));
    let engine =
        PipelineEngine::new(store, Arc::new(audit)).with_config(config.engine_config());
    info!(
        store = config.store.as_str(),
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        retry_on_conflict = config.retry_on_conflict,
        "pipeline engine ready"
    );
    let state = AppState {
        schema: graphql::build_schema(engine.clone(), feed),
        engine,
        config,
    };
    http::serve((&cmd).into(), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `cargo run -p server -- migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}
