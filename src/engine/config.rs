//! GenomeDB Configuration Module
//! Handles loading and validating genomedb.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "genomedb.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    pub relational: RelationalConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub query: QueryLimits,
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Bounds the coordinator applies to every combined query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryLimits {
    /// Page size when the caller does not send one
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Largest page size a caller may ask for
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Hard cap on identifiers assembled per query, including the list-all path
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
    /// Per store call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            result_cap: default_result_cap(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl QueryLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit == 0 {
            return Err(ConfigError::Invalid("query.default_limit must be at least 1".to_string()));
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid(format!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                self.default_limit, self.max_limit
            )));
        }
        if self.result_cap == 0 {
            return Err(ConfigError::Invalid("query.result_cap must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("query.timeout_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_pool_size() -> u32 {
    8
}

fn default_collection() -> String {
    "variants".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_max_limit() -> usize {
    1000
}

fn default_result_cap() -> usize {
    1000
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_port() -> u16 {
    54330
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.query.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
                id: format!("genomedb-{}", name),
            },
            relational: RelationalConfig {
                path: PathBuf::from("./data/clinical.db"),
                pool_size: default_pool_size(),
            },
            documents: DocumentsConfig {
                path: PathBuf::from("./data/documents"),
                collection: default_collection(),
            },
            query: QueryLimits::default(),
            api: ApiConfig {
                port: default_port(),
                host: default_host(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Environment wins over the file; unparsable values are ignored
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("GENOMEDB_RELATIONAL_PATH") {
            self.relational.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("GENOMEDB_DOCUMENTS_PATH") {
            self.documents.path = PathBuf::from(path);
        }
        if let Some(ms) = lookup("GENOMEDB_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.query.timeout_ms = ms;
        }
        if let Some(level) = lookup("GENOMEDB_LOG") {
            self.logging.level = level;
        }
    }

    pub fn relational_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.relational.path)
    }

    pub fn documents_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.documents.path)
    }
}
