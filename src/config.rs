use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,   // Model name
    pub api_key: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file. When no path is given, the
    /// default locations are checked in order; if none exists the built-in
    /// defaults are used.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();
        let mut found_source = false;

        if let Some(config_path) = config_path {
            config_builder = config_builder.add_source(File::from(config_path));
            found_source = true;
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-viz/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    found_source = true;
                    break;
                }
            }
        }

        if !found_source {
            return Ok(Self::default());
        }

        config_builder.build()?.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "nl-viz.db".to_string(),
                pool_size: 5,
            },
            llm: LlmConfig {
                backend: "ollama".to_string(),
                model: "sqlcoder".to_string(),
                api_key: None,
                api_url: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_file_exists() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/also-missing.toml")));
        // An explicit path that does not exist is an error, not a silent default.
        assert!(config.is_err());

        let config = AppConfig::default();
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.llm.backend, "ollama");
    }
}
