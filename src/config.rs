use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::validation::validate_identifier;

pub const DEFAULT_TABLE_PREFIX: &str = "coldstart";
pub const DEFAULT_MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Mock,
    Bigquery,
}

impl Default for Backend {
    fn default() -> Self {
        Self::Mock
    }
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "bigquery" => Ok(Backend::Bigquery),
            other => Err(Error::Config(format!("Unknown backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dialect: Option<String>,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub catalog_dir: Option<PathBuf>,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default = "default_drop_intermediate_tables")]
    pub drop_intermediate_tables: bool,
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_drop_intermediate_tables() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            catalog_dir: None,
            table_prefix: default_table_prefix(),
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: None,
            stop_on_error: false,
            drop_intermediate_tables: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("Cannot read config file: {}", e)))?;
                Self::from_toml(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("FEATURE_FACTORY_DIALECT") {
            self.engine.dialect = Some(val);
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_BACKEND") {
            self.engine.backend = val.parse()?;
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_PROJECT_ID") {
            self.engine.project_id = Some(val);
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_SCHEMA") {
            self.engine.schema = Some(val);
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_CATALOG_DIR") {
            self.run.catalog_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_MAX_WORKERS") {
            self.run.max_workers = val.parse().map_err(|_| {
                Error::Config(format!("FEATURE_FACTORY_MAX_WORKERS is not a number: {}", val))
            })?;
        }
        if let Ok(val) = std::env::var("FEATURE_FACTORY_LOG_FORMAT") {
            self.logging.format = match val.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.run.batch_size == Some(0) {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        validate_identifier("table_prefix", &self.run.table_prefix)?;
        match &self.run.catalog_dir {
            Some(dir) if !dir.exists() => warn!("Catalog directory does not exist: {:?}", dir),
            None => warn!("No catalog_dir configured - only explicit catalogs can be used"),
            _ => {}
        }
        if self.engine.backend == Backend::Bigquery && self.engine.project_id.is_none() {
            warn!("BigQuery backend selected without project_id - credentials project will be used");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.engine.backend, Backend::Mock);
        assert!(config.engine.schema.is_none());
        assert_eq!(config.run.table_prefix, "coldstart");
        assert_eq!(config.run.max_workers, 8);
        assert!(config.run.drop_intermediate_tables);
        assert!(!config.run.stop_on_error);
    }

    #[test]
    fn test_config_load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
dialect = "bigquery"
backend = "bigquery"
project_id = "my-project"
schema = "my_schema"
location = "US"

[run]
table_prefix = "ff"
max_workers = 4
batch_size = 10
stop_on_error = true
drop_intermediate_tables = false

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.engine.dialect.as_deref(), Some("bigquery"));
        assert_eq!(config.engine.backend, Backend::Bigquery);
        assert_eq!(config.engine.location.as_deref(), Some("US"));
        assert_eq!(config.run.table_prefix, "ff");
        assert_eq!(config.run.batch_size, Some(10));
        assert!(config.run.stop_on_error);
        assert!(!config.run.drop_intermediate_tables);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_partial_sections_use_defaults() {
        let config = Config::from_toml("[run]\nmax_workers = 2\n").unwrap();
        assert_eq!(config.run.max_workers, 2);
        assert_eq!(config.run.table_prefix, "coldstart");
        assert!(config.run.drop_intermediate_tables);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();

        let result = Config::load(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        let config = Config::from_toml("[run]\nmax_workers = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_batch_size() {
        let config = Config::from_toml("[run]\nbatch_size = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_prefix_that_cannot_name_tables() {
        for prefix in ["", "cold-start", "cold start", "1st"] {
            let mut config = Config::default();
            config.run.table_prefix = prefix.to_string();
            assert!(
                matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("table_prefix")),
                "prefix {:?} should be rejected",
                prefix
            );
        }
        let config = Config::from_toml("[run]\ntable_prefix = \"ff_v2\"\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("BigQuery".parse::<Backend>().unwrap(), Backend::Bigquery);
        assert_eq!("mock".parse::<Backend>().unwrap(), Backend::Mock);
        assert!("snowflake".parse::<Backend>().is_err());
    }

    #[test]
    fn test_env_var_override_schema() {
        env::set_var("FEATURE_FACTORY_SCHEMA", "env_schema");
        let config = Config::load(None).unwrap();
        env::remove_var("FEATURE_FACTORY_SCHEMA");

        assert_eq!(config.engine.schema.as_deref(), Some("env_schema"));
    }

    #[test]
    fn test_env_var_override_project_id() {
        env::set_var("FEATURE_FACTORY_PROJECT_ID", "env-project");
        let config = Config::load(None).unwrap();
        env::remove_var("FEATURE_FACTORY_PROJECT_ID");

        assert_eq!(config.engine.project_id.as_deref(), Some("env-project"));
    }

    #[test]
    fn test_env_var_override_log_format() {
        env::set_var("FEATURE_FACTORY_LOG_FORMAT", "json");
        let config = Config::load(None).unwrap();
        env::remove_var("FEATURE_FACTORY_LOG_FORMAT");

        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
