//! Configuration for the compile service
//!
//! Loaded from `config.yaml`; environment variables (including those from a
//! `.env` file) override file values.

use relc_ir::{InMemoryCatalog, TableSchema};
use relc_registry::Dialect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Dialect used when a request names none.
    pub default_dialect: Dialect,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_dialect: Dialect::DuckDB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `relc_server=debug,relc=trace`
    pub level: String,

    /// pretty, json or compact
    pub format: String,

    /// stdout, file or both
    pub output: String,

    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Table schemas plans may reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub compiler: CompilerConfig,
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
}

impl Config {
    /// Load `path` and apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("RELC_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("RELC_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "RELC_SERVER_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Ok(dialect) = std::env::var("RELC_DEFAULT_DIALECT") {
            self.compiler.default_dialect =
                dialect.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "RELC_DEFAULT_DIALECT".to_string(),
                    value: dialect.clone(),
                })?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
        Ok(())
    }

    pub fn catalog(&self) -> InMemoryCatalog {
        InMemoryCatalog::from(self.catalog.tables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relc_ir::{DataType, SchemaProvider};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.compiler.default_dialect, Dialect::DuckDB);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "stdout");
        assert!(config.catalog.tables.is_empty());
    }

    #[test]
    fn test_yaml_catalog_and_env_override() {
        std::env::set_var("RELC_SERVER_PORT", "9090");
        std::env::set_var("RELC_DEFAULT_DIALECT", "pg");

        let config_yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080
compiler:
  default_dialect: spark
catalog:
  tables:
    - name: events
      fields:
        - name: id
          data_type: int64
          nullable: false
        - name: ts
          data_type: timestamp
"#;
        let temp_file = std::env::temp_dir().join("relc_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.compiler.default_dialect, Dialect::Postgres);
        // Sections missing from the file fall back to defaults.
        assert_eq!(config.logging.directory, "./logs");

        let schema = config.catalog().table_schema("events").unwrap();
        assert_eq!(schema.names(), vec!["id", "ts"]);
        assert!(!schema.fields[0].nullable);
        assert_eq!(schema.fields[1].data_type, DataType::Timestamp);

        std::env::remove_var("RELC_SERVER_PORT");
        std::env::remove_var("RELC_DEFAULT_DIALECT");
        std::fs::remove_file(temp_file).ok();
    }
}
