// services/keyspace-migrator/src/main.rs
//
// keyspace-migrator - create/drop a keyspace and move it forwards or
// backwards through versioned CQL migrations
//

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use svckit::types::MigrationId;

#[derive(Parser, Debug)]
#[command(name = "keyspace-migrator")]
#[command(about = "Keyspace lifecycle and CQL schema migrations for ScyllaDB/Cassandra")]
struct Args {
    /// Path to the environment configuration file
    #[arg(short, long, default_value = "config/cequel.yml")]
    config: String,

    /// Environment section to use
    #[arg(short, long, env = "CEQUEL_ENV", default_value = "development")]
    env: String,

    /// Directory of <id>_<name>.up.cql / .down.cql scripts
    #[arg(short, long, default_value = "cequel/migrate")]
    migrations: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Create the environment's keyspace
    Create,
    /// Drop the environment's keyspace
    Drop,
    /// Apply pending migrations
    Migrate {
        /// Stop after this migration
        #[arg(long)]
        to: Option<MigrationId>,
    },
    /// Reverse applied migrations, most recently applied first
    Rollback {
        /// Number of migrations to reverse
        #[arg(long, default_value = "1", conflicts_with = "to")]
        steps: usize,

        /// Reverse everything applied above this migration
        #[arg(long)]
        to: Option<MigrationId>,
    },
    /// Show applied and pending migrations
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Generate an empty timestamped migration pair
    New {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyspace_migrator=info,svckit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Command::New { ref name } = args.command {
        return commands::generate(&args.migrations, name).await;
    }

    info!("Environment: {}", args.env);
    info!("Configuration: {}", args.config);
    let env = config::load_environment(&args.config, &args.env)?;

    match args.command {
        Command::Create => commands::create(&env).await,
        Command::Drop => commands::drop(&env).await,
        Command::Migrate { to } => commands::migrate(&env, &args.migrations, to).await,
        Command::Rollback { steps, to } => commands::rollback(&env, &args.migrations, steps, to).await,
        Command::Status { json } => commands::status(&env, &args.migrations, json).await,
        Command::New { .. } => Ok(()),
    }
}
