// svckit/src/migration/source.rs
//
// MigrationDirectory - loads CQL migrations from a directory of
// `<id>_<name>.up.cql` / `<id>_<name>.down.cql` files and generates
// new timestamped pairs.
//

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::unit::{CqlMigration, MigrationSet};
use crate::errors::MigratorError;
use crate::types::MigrationId;

const UP_SUFFIX: &str = ".up.cql";
const DOWN_SUFFIX: &str = ".down.cql";

#[derive(Debug, Clone)]
pub struct MigrationDirectory {
    path: PathBuf,
}

#[derive(Debug, Default)]
struct ScriptPair {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

impl MigrationDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every migration in the directory. A missing directory is an empty set.
    pub async fn load(&self) -> Result<MigrationSet, MigratorError> {
        let mut set = MigrationSet::new();
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        if !exists {
            info!("Migration directory {} does not exist", self.path.display());
            return Ok(set);
        }

        let mut pairs: BTreeMap<(MigrationId, String), ScriptPair> = BTreeMap::new();
        let mut entries = fs::read_dir(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&self.path, e))? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let (stem, is_up) = if let Some(stem) = file_name.strip_suffix(UP_SUFFIX) {
                (stem.to_string(), true)
            } else if let Some(stem) = file_name.strip_suffix(DOWN_SUFFIX) {
                (stem.to_string(), false)
            } else {
                debug!("Skipping {}", file_name);
                continue;
            };

            let key = parse_stem(&stem)?;
            let pair = pairs.entry(key).or_default();
            if is_up {
                pair.up = Some(entry.path());
            } else {
                pair.down = Some(entry.path());
            }
        }

        for ((id, name), pair) in pairs {
            let up_path = pair.up.ok_or_else(|| {
                MigratorError::ConfigError(format!(
                    "migration {}_{} has a down script but no up script",
                    id, name
                ))
            })?;

            let up = fs::read_to_string(&up_path).await.map_err(|e| io_error(&up_path, e))?;
            let down = match pair.down {
                Some(ref path) => Some(fs::read_to_string(path).await.map_err(|e| io_error(path, e))?),
                None => None,
            };

            set.register(CqlMigration::from_scripts(id, name, &up, down.as_deref()))?;
        }

        info!("Loaded {} migration(s) from {}", set.len(), self.path.display());
        Ok(set)
    }

    /// Write an empty up/down pair named after `at`, returning both paths
    pub async fn generate(&self, name: &str, at: DateTime<Utc>) -> Result<(PathBuf, PathBuf), MigratorError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(MigratorError::ConfigError(format!("invalid migration name '{}'", name)));
        }

        fs::create_dir_all(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        let id = at.format("%Y%m%d%H%M%S").to_string();
        let up_path = self.path.join(format!("{}_{}{}", id, slug, UP_SUFFIX));
        let down_path = self.path.join(format!("{}_{}{}", id, slug, DOWN_SUFFIX));

        for path in [&up_path, &down_path] {
            if fs::try_exists(path).await.map_err(|e| io_error(path, e))? {
                return Err(MigratorError::ConfigError(format!(
                    "{} already exists",
                    path.display()
                )));
            }
        }

        fs::write(&up_path, format!("-- {} {}: apply\n", id, slug))
            .await
            .map_err(|e| io_error(&up_path, e))?;
        fs::write(
            &down_path,
            format!("-- {} {}: revert (leave empty to make it irreversible)\n", id, slug),
        )
        .await
        .map_err(|e| io_error(&down_path, e))?;

        info!("Generated {} and {}", up_path.display(), down_path.display());
        Ok((up_path, down_path))
    }
}

/// `20240117120000_create_users` -> (20240117120000, "create_users")
fn parse_stem(stem: &str) -> Result<(MigrationId, String), MigratorError> {
    let (id, name) = stem.split_once('_').ok_or_else(|| {
        MigratorError::ConfigError(format!(
            "migration file '{}' must be named <id>_<name>",
            stem
        ))
    })?;

    let id: MigrationId = id.parse().map_err(MigratorError::ConfigError)?;
    if name.is_empty() {
        return Err(MigratorError::ConfigError(format!(
            "migration file '{}' has no name",
            stem
        )));
    }
    Ok((id, name.to_string()))
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn io_error(path: &Path, err: std::io::Error) -> MigratorError {
    MigratorError::ConfigError(format!("{}: {}", path.display(), err))
}
