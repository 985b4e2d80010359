//! # Chronos Sync Main Entry Point
//!
//! CLI entry point for the calendar sync service.

use chronos_sync::{config::ConfigLoader, db, server::run_server, telemetry};
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;

#[derive(Parser)]
#[command(name = "chronos-sync")]
#[command(about = "Google Calendar synchronization service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run the API server (default)
    Serve,
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    let db = db::init_pool(&config).await?;

    if let Some(Commands::Migrate { action }) = cli.command {
        return handle_migrate_command(&db, action).await;
    }

    // Migrations apply automatically for local and test profiles; deployed
    // profiles run them as an explicit release step.
    if config.profile == "local" || config.profile == "test" {
        tracing::info!(profile = %config.profile, "Running migrations automatically");
        Migrator::up(&db, None).await?;
    }

    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Loaded configuration");
    }

    run_server(config, db).await
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match action {
        MigrateAction::Up => {
            println!("Applying migrations...");
            Migrator::up(db, None).await?;
            println!("All migrations applied successfully");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(db, Some(1)).await?;
            println!("Migration rolled back successfully");
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;
            println!("Applied migrations: {}", applied.len());
            println!("Pending migrations: {}", pending.len());
        }
    }
    Ok(())
}
