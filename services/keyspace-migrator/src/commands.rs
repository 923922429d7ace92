// services/keyspace-migrator/src/commands.rs
//
// One function per subcommand. Each opens its own connection through the
// scylla connector and reports what it did.
//

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use tracing::info;

use svckit::config::EnvironmentConfig;
use svckit::database::{KeyspaceManager, ScyllaConnector};
use svckit::migration::{MigrationDirectory, MigrationRunner, RunReport, StatusReport};
use svckit::types::MigrationId;

pub async fn create(env: &EnvironmentConfig) -> Result<()> {
    let manager = KeyspaceManager::connect(env, &ScyllaConnector).await?;
    manager.create_keyspace().await?;
    Ok(())
}

pub async fn drop(env: &EnvironmentConfig) -> Result<()> {
    let manager = KeyspaceManager::connect(env, &ScyllaConnector).await?;
    manager.drop_keyspace().await?;
    Ok(())
}

pub async fn migrate(env: &EnvironmentConfig, migrations: &Path, to: Option<MigrationId>) -> Result<()> {
    let mut runner = connect_runner(env, migrations).await?;
    let report = match to {
        Some(target) => runner.migrate_to(target).await?,
        None => runner.migrate().await?,
    };
    log_report(&report);
    Ok(())
}

pub async fn rollback(
    env: &EnvironmentConfig,
    migrations: &Path,
    steps: usize,
    to: Option<MigrationId>,
) -> Result<()> {
    let mut runner = connect_runner(env, migrations).await?;
    let report = match to {
        Some(target) => runner.rollback_to(target).await?,
        None => runner.rollback(steps).await?,
    };
    log_report(&report);
    Ok(())
}

pub async fn status(env: &EnvironmentConfig, migrations: &Path, json: bool) -> Result<()> {
    let mut runner = connect_runner(env, migrations).await?;
    let report = runner.status().await?;

    if json {
        println!("{}", render_status_json(&report)?);
    } else {
        print!("{}", render_status(env.keyspace()?, &report));
    }
    Ok(())
}

pub async fn generate(migrations: &Path, name: &str) -> Result<()> {
    let (up, down) = MigrationDirectory::new(migrations).generate(name, Utc::now()).await?;
    println!("{}", up.display());
    println!("{}", down.display());
    Ok(())
}

async fn connect_runner(env: &EnvironmentConfig, migrations: &Path) -> Result<MigrationRunner> {
    let set = MigrationDirectory::new(migrations).load().await?;
    Ok(MigrationRunner::connect(env, &ScyllaConnector, set).await?)
}

fn log_report(report: &RunReport) {
    if report.is_noop() {
        info!("Nothing to do");
        return;
    }
    let ids: Vec<String> = report.migrations.iter().map(|id| id.to_string()).collect();
    info!(
        "Completed {} {} migration(s): {}",
        ids.len(),
        report.direction,
        ids.join(", ")
    );
}

/// Known migrations and orphaned history rows as one JSON document
pub fn render_status_json(report: &StatusReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Table of every known migration, orphaned history rows last
pub fn render_status(keyspace: &str, report: &StatusReport) -> String {
    let mut out = format!("\nkeyspace: {}\n\n", keyspace);
    out.push_str(&format!(" {:<8} {:<16} {}\n", "Status", "Migration ID", "Name"));
    out.push_str(&format!("{}\n", "-".repeat(50)));

    for m in &report.migrations {
        let state = if m.is_applied() { "up" } else { "down" };
        out.push_str(&format!(" {:<8} {:<16} {}\n", state, m.id.to_string(), m.name));
    }
    for entry in &report.orphaned {
        out.push_str(&format!(
            " {:<8} {:<16} {} (no script)\n",
            "up",
            entry.id.to_string(),
            entry.name
        ));
    }
    out
}
