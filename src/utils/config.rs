use crate::core::constants::{
    DEFAULT_ATTITUDE_FILTER_DEG, DEFAULT_DIAGNOSTICS_CAPACITY, DEFAULT_DISTANCE_FILTER_M,
    DEFAULT_HEADING_FILTER_DEG,
};
use crate::core::AccuracyMode;
use crate::session::FilterThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Bridge configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Minimum horizontal movement before a location update (m)
    pub distance_filter_m: f64,
    /// Minimum heading change before a heading update (degrees)
    pub heading_filter_deg: f64,
    /// Minimum orientation change before an attitude update (degrees)
    pub attitude_filter_deg: f64,
    /// Accuracy requested from the producer
    pub desired_accuracy: AccuracyMode,
    /// Observer failures retained for diagnostics
    pub diagnostics_capacity: usize,
    /// Producer credentials, if the producer needs authentication
    pub credentials: Option<ApiCredentials>,
}

/// Producer API key and secret
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Invalid parameter value
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    /// Configuration file I/O error
    #[error("I/O error: {message}")]
    Io { message: String },
    /// JSON serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
            heading_filter_deg: DEFAULT_HEADING_FILTER_DEG,
            attitude_filter_deg: DEFAULT_ATTITUDE_FILTER_DEG,
            desired_accuracy: AccuracyMode::Best,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            credentials: None,
        }
    }
}

/// Filter thresholds must be finite and non-negative
pub(crate) fn validate_threshold(parameter: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: "must be a finite, non-negative number".to_string(),
        })
    }
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (parameter, value) in [("api_key", &self.api_key), ("api_secret", &self.api_secret)] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidParameter {
                    parameter: parameter.to_string(),
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl BridgeConfig {
    pub fn thresholds(&self) -> FilterThresholds {
        FilterThresholds {
            distance_m: self.distance_filter_m,
            heading_deg: self.heading_filter_deg,
            attitude_deg: self.attitude_filter_deg,
        }
    }

    /// Validate every parameter; the first problem found is returned
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds().validate()?;
        if self.diagnostics_capacity == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "diagnostics_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(content).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        Self::from_json_str(&content)
    }

    /// Save configuration to JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        self.validate()?;

        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }
}
