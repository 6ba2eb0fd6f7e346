//! Configuration management for crmflow.
//!
//! Configuration can be set via environment variables:
//! - `AZURE_OPENAI_API_KEY` - Required. Azure OpenAI API key.
//! - `AZURE_OPENAI_ENDPOINT` - Required. Azure OpenAI resource endpoint.
//! - `AZURE_OPENAI_API_VERSION` - Optional. Defaults to `2024-12-01-preview`.
//! - `AZURE_OPENAI_DEPLOYMENT` - Optional. Chat deployment name. Defaults to `gpt-4o`.
//! - `CRM_DATABASE_PATH` - Optional. SQLite database file. Defaults to `crm.db`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `AGENT_MAX_STEPS` - Optional. Maximum solver loop steps. Defaults to `10`.
//! - `AGENT_MAX_TIME_SECS` - Optional. Wall-clock budget per solve. Defaults to `300`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Solver loop budgets.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum steps per solve invocation
    pub max_steps: usize,

    /// Wall-clock budget per solve invocation
    pub max_time: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_time: Duration::from_secs(300),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Azure OpenAI API key
    pub api_key: String,

    /// Azure OpenAI resource endpoint, e.g. `https://myresource.openai.azure.com`
    pub endpoint: String,

    /// Azure OpenAI API version
    pub api_version: String,

    /// Chat completions deployment name
    pub deployment: String,

    /// Path to the CRM SQLite database
    pub database_path: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Solver budgets
    pub solver: SolverConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `AZURE_OPENAI_API_KEY` or
    /// `AZURE_OPENAI_ENDPOINT` is not set, or `ConfigError::InvalidValue`
    /// for unparseable numeric values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("AZURE_OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("AZURE_OPENAI_API_KEY".to_string()))?;

        let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT")
            .map_err(|_| ConfigError::MissingEnvVar("AZURE_OPENAI_ENDPOINT".to_string()))?;

        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2024-12-01-preview".to_string());

        let deployment =
            std::env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or_else(|_| "gpt-4o".to_string());

        let database_path = std::env::var("CRM_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("crm.db"));

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), e.to_string()))?,
            Err(_) => 3000,
        };

        let max_steps = match std::env::var("AGENT_MAX_STEPS") {
            Ok(v) => v.parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("AGENT_MAX_STEPS".to_string(), e.to_string())
            })?,
            Err(_) => 10,
        };

        let max_time_secs = match std::env::var("AGENT_MAX_TIME_SECS") {
            Ok(v) => v.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("AGENT_MAX_TIME_SECS".to_string(), e.to_string())
            })?,
            Err(_) => 300,
        };

        Ok(Self {
            api_key,
            endpoint,
            api_version,
            deployment,
            database_path,
            host,
            port,
            solver: SolverConfig {
                max_steps,
                max_time: Duration::from_secs(max_time_secs),
            },
        })
    }
}
