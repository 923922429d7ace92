// svckit/src/config.rs
//
// Environment configuration - the per-environment connection parameters
// read from the migrator YAML file (host, keyspace, replication strategy,
// client options) and the resolver that hands them out by environment name.
//

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::MigratorError;

/// Prefix for environment variable overrides, e.g. `CEQUEL__PRODUCTION__HOST`
pub const ENV_PREFIX: &str = "CEQUEL";

static EMPTY_OPTIONS: BTreeMap<String, ScalarValue> = BTreeMap::new();

/// Scalar option value as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Numeric view, used for timeouts expressed in seconds
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Text(s) => s.trim().parse().ok(),
            ScalarValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

/// One environment's section of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub host: Option<String>,
    pub keyspace: Option<String>,
    pub strategy_class: Option<String>,
    pub strategy_options: Option<BTreeMap<String, ScalarValue>>,
    #[serde(alias = "thrift")]
    pub client_options: Option<BTreeMap<String, ScalarValue>>,
}

impl EnvironmentConfig {
    pub fn host(&self) -> Result<&str, MigratorError> {
        required(self.host.as_deref(), "host")
    }

    pub fn keyspace(&self) -> Result<&str, MigratorError> {
        required(self.keyspace.as_deref(), "keyspace")
    }

    pub fn strategy_class(&self) -> Result<&str, MigratorError> {
        required(self.strategy_class.as_deref(), "strategy_class")
    }

    /// Client options section; an absent section reads as empty
    pub fn client_options(&self) -> &BTreeMap<String, ScalarValue> {
        self.client_options.as_ref().unwrap_or(&EMPTY_OPTIONS)
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, MigratorError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MigratorError::ConfigError(format!("'{}' is not configured", key))),
    }
}

/// Typed view of `client_options`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOptions {
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn from_options(options: &BTreeMap<String, ScalarValue>) -> Result<Self, MigratorError> {
        let mut client = ClientOptions::default();

        for (key, value) in options {
            match key.as_str() {
                "connect_timeout" => client.connect_timeout = Some(seconds(key, value)?),
                "timeout" => client.request_timeout = Some(seconds(key, value)?),
                other => warn!("Ignoring unsupported client option: {}", other),
            }
        }

        Ok(client)
    }

    pub fn is_empty(&self) -> bool {
        self.connect_timeout.is_none() && self.request_timeout.is_none()
    }
}

fn seconds(key: &str, value: &ScalarValue) -> Result<Duration, MigratorError> {
    match value.as_f64() {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(MigratorError::ConfigError(format!(
            "client option '{}' must be a non-negative number of seconds, got '{}'",
            key, value
        ))),
    }
}

/// Resolves environment names to their configuration.
/// Built once per process and passed to whatever needs a connection.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    environments: HashMap<String, EnvironmentConfig>,
}

impl ConfigResolver {
    /// Load a YAML file keyed by environment name, with `CEQUEL__<ENV>__<KEY>` overrides
    pub fn from_file(path: &str) -> Result<Self, MigratorError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MigratorError::ConfigError(format!("{}: {}", path, e)))?;

        let resolver = Self::load(&contents, Some(ENV_PREFIX))?;
        info!(
            "Loaded {} environment(s) from {}",
            resolver.environments.len(),
            path
        );
        Ok(resolver)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, MigratorError> {
        Self::load(yaml, None)
    }

    pub fn from_environments<I>(environments: I) -> Self
    where
        I: IntoIterator<Item = (String, EnvironmentConfig)>,
    {
        Self {
            environments: environments.into_iter().collect(),
        }
    }

    // serde_yaml keeps key case; datacenter names in strategy_options are case-sensitive
    fn load(yaml: &str, env_prefix: Option<&str>) -> Result<Self, MigratorError> {
        let mut document: Value = serde_yaml::from_str(yaml)?;
        if document.is_null() {
            document = Value::Mapping(Mapping::new());
        }
        if let Some(prefix) = env_prefix {
            merge_overrides(&mut document, env_overrides(prefix)?);
        }

        let environments: HashMap<String, EnvironmentConfig> = serde_yaml::from_value(document)?;
        Ok(Self { environments })
    }

    /// Section for `environment`, or `None` when the file has no such section
    pub fn resolve(&self, environment: &str) -> Option<&EnvironmentConfig> {
        self.environments.get(environment)
    }

    pub fn require(&self, environment: &str) -> Result<&EnvironmentConfig, MigratorError> {
        self.resolve(environment).ok_or_else(|| {
            MigratorError::ConfigError(format!(
                "environment '{}' not found in configuration (known: {})",
                environment,
                self.environment_names().join(", ")
            ))
        })
    }

    pub fn environment_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.environments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// `<PREFIX>__<ENV>__<KEY>` variables as a nested document. Values stay strings.
fn env_overrides(prefix: &str) -> Result<Value, MigratorError> {
    let overrides = Config::builder()
        .add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(overrides.try_deserialize()?)
}

/// Lay `overrides` over `base`. The config crate lowercases variable names,
/// so keys match case-insensitively against what the file already has.
fn merge_overrides(base: &mut Value, overrides: Value) {
    let overrides = match overrides {
        Value::Mapping(overrides) => overrides,
        scalar => {
            *base = scalar;
            return;
        }
    };
    if !base.is_mapping() {
        *base = Value::Mapping(Mapping::new());
    }

    if let Value::Mapping(base) = base {
        for (key, value) in overrides {
            let target = key
                .as_str()
                .and_then(|k| {
                    base.keys()
                        .find(|existing| existing.as_str().is_some_and(|e| e.eq_ignore_ascii_case(k)))
                        .cloned()
                })
                .unwrap_or(key);

            match base.get_mut(&target) {
                Some(slot) => merge_overrides(slot, value),
                None => {
                    base.insert(target, value);
                }
            }
        }
    }
}
