use std::path::{Path, PathBuf};

use socialconnect_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{AppConfig, FailurePolicy};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SOCIALCONNECT_CONFIG";

/// Builds an `AppConfig` from an optional YAML/TOML file overlaid with
/// environment variables (a `.env` file in the working directory is honoured).
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Use `$SOCIALCONNECT_CONFIG`, falling back to `~/.socialconnect/config.yml`.
    pub fn new() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_dir().join("config.yml"));
        Self { path: Some(path) }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Skip the file layer entirely; only defaults and the environment apply.
    pub fn env_only() -> Self {
        Self { path: None }
    }

    pub fn load(&self) -> Result<AppConfig> {
        if let Ok(dotenv) = dotenvy::dotenv() {
            debug!("loaded environment from {}", dotenv.display());
        }
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) but reads variables through `lookup`
    /// instead of the process environment.
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.path {
            Some(path) if path.exists() => {
                info!("reading config from {}", path.display());
                read_config_file(path)?
            }
            _ => AppConfig::default(),
        };

        apply_env_overrides(&mut config, lookup)?;
        config.database.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".socialconnect")
}

fn read_config_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
        "toml" => {
            toml::from_str(&contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
        }
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let db = &mut config.database;

    if let Some(v) = lookup("DB_HOST") {
        db.host = v;
    }
    if let Some(v) = lookup("DB_PORT") {
        db.port = parse_number("DB_PORT", &v)?;
    }
    if let Some(v) = lookup("DB_USER") {
        db.user = v;
    }
    if let Some(v) = lookup("DB_PASSWORD") {
        db.password = Some(v);
    }
    if let Some(v) = lookup("DB_NAME") {
        db.database = v;
    }
    if let Some(v) = lookup("DB_CHARSET") {
        db.charset = v;
    }
    if let Some(v) = lookup("DB_CONNECT_TIMEOUT") {
        db.connect_timeout_secs = parse_number("DB_CONNECT_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("DB_READ_TIMEOUT") {
        db.read_timeout_secs = parse_number("DB_READ_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("DB_WRITE_TIMEOUT") {
        db.write_timeout_secs = parse_number("DB_WRITE_TIMEOUT", &v)?;
    }

    if let Some(v) = lookup("MIGRATE_ON_FAILURE") {
        config.runner.on_failure = v.parse::<FailurePolicy>()?;
    }
    if let Some(v) = lookup("MIGRATE_CREATE_DATABASE") {
        config.runner.create_database = parse_bool("MIGRATE_CREATE_DATABASE", &v)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}
