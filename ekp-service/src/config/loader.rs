//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use super::AppConfig;
use crate::error::{ServiceError, ServiceResult};

/// Load configuration from `config.*` in the working directory and `EKP__*` env vars
pub fn load_config() -> ServiceResult<AppConfig> {
    load_config_from("config")
}

/// Load configuration using `file_stem` as the config file name (extension optional)
pub fn load_config_from(file_stem: &str) -> ServiceResult<AppConfig> {
    let config: AppConfig = Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(
            Environment::with_prefix("EKP")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> ServiceResult<()> {
    if config.ingestion.chunk_size == 0 {
        return Err(ServiceError::Config {
            message: "ingestion.chunk_size must be greater than zero".to_string(),
        });
    }
    if config.ingestion.chunk_overlap >= config.ingestion.chunk_size {
        return Err(ServiceError::Config {
            message: "ingestion.chunk_overlap must be smaller than ingestion.chunk_size"
                .to_string(),
        });
    }
    if config.qa.max_model_attempts == 0 {
        return Err(ServiceError::Config {
            message: "qa.max_model_attempts must be at least 1".to_string(),
        });
    }
    if config.ollama.request_timeout_secs == 0 {
        return Err(ServiceError::Config {
            message: "ollama.request_timeout_secs must be greater than zero".to_string(),
        });
    }
    Ok(())
}
