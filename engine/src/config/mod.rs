//! Configuration management
//!
//! This module handles loading, validation, and management of the task loop
//! configuration. Configuration is stored in TOML format at
//! ~/.taskloop/config.toml. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **agent**: Step budget, sampling settings, default instructions
//! - **pricing**: Model id to price table used by the cost accountant
//! - **telemetry**: Remote logging sink endpoint and delivery settings
//!
//! # Examples
//!
//! ```no_run
//! use taskloop_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! // Access configuration values
//! println!("Step budget: {}", config.agent.max_steps);
//! println!("Log endpoint: {:?}", config.telemetry.endpoint);
//! # Ok(())
//! # }
//! ```

use crate::costs::PricingTable;
use sdk::AgentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Task loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model pricing
    #[serde(default)]
    pub pricing: PricingTable,

    /// Logging sink settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Logging level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Task loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of execution rounds per interaction
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Sampling temperature handed to the model adapter
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Completion token limit handed to the model adapter
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Instructions used when the agent is built without its own
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

/// Logging sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// HTTP endpoint receiving log events. Without one, events go to `tracing`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with every event
    #[serde(default)]
    pub api_key: Option<String>,

    /// Delivery attempts per event before it is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles on each further attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Events buffered before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Minimum interval between two local delivery-failure warnings
    #[serde(default = "default_error_log_interval_secs")]
    pub error_log_interval_secs: u64,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_steps() -> u32 {
    10
}

fn default_instructions() -> String {
    "You are a helpful assistant. Use the available actions to accomplish the user's request, \
     then answer with a concise summary of the result."
        .to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_queue_capacity() -> usize {
    256
}

fn default_error_log_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            temperature: None,
            max_tokens: None,
            instructions: default_instructions(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            error_log_interval_secs: default_error_log_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_secs(self.error_log_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.taskloop/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, AgentError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, AgentError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, AgentError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, AgentError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AgentError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        config.save_to_path(path)?;

        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save_to_path(&self, path: &Path) -> Result<(), AgentError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| AgentError::Config(format!("Failed to write config file: {}", e)))
    }

    /// Get the default configuration file path (~/.taskloop/config.toml)
    fn default_config_path() -> Result<PathBuf, AgentError> {
        let home = dirs::home_dir()
            .ok_or_else(|| AgentError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".taskloop").join("config.toml"))
    }

    /// Validate and process configuration
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` naming the offending field.
    pub fn validate_and_process(&mut self) -> Result<(), AgentError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        self.core.log_level = self.core.log_level.to_lowercase();
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(AgentError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.agent.max_steps == 0 {
            return Err(AgentError::Config(
                "max_steps must be at least 1".to_string(),
            ));
        }

        if let Some(temperature) = self.agent.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AgentError::Config(
                    "temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.agent.max_tokens == Some(0) {
            return Err(AgentError::Config(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        let prices = std::iter::once(("default", &self.pricing.default)).chain(
            self.pricing
                .models
                .iter()
                .map(|(id, pricing)| (id.as_str(), pricing)),
        );
        for (id, pricing) in prices {
            let valid = |v: f64| v.is_finite() && v >= 0.0;
            if !valid(pricing.input_cost_per_million_tokens)
                || !valid(pricing.output_cost_per_million_tokens)
            {
                return Err(AgentError::Config(format!(
                    "Pricing for '{}' must be non-negative",
                    id
                )));
            }
        }

        if let Some(endpoint) = &self.telemetry.endpoint {
            let url = reqwest::Url::parse(endpoint).map_err(|e| {
                AgentError::Config(format!("Invalid telemetry endpoint '{}': {}", endpoint, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AgentError::Config(format!(
                    "Telemetry endpoint must use http or https, got '{}'",
                    url.scheme()
                )));
            }
        }

        if self.telemetry.max_attempts == 0 {
            return Err(AgentError::Config(
                "telemetry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.telemetry.queue_capacity == 0 {
            return Err(AgentError::Config(
                "telemetry.queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
