use anyhow::{Context, Result};
use svckit::config::{ConfigResolver, EnvironmentConfig};

/// Load `path` and pick the `environment` section out of it
pub fn load_environment(path: &str, environment: &str) -> Result<EnvironmentConfig> {
    let resolver = ConfigResolver::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path))?;

    Ok(resolver.require(environment)?.clone())
}
