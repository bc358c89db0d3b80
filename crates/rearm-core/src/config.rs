use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RearmError, Result};
use crate::types::Mode;

/// Top-level configuration for the Rearm service.
///
/// Loaded from `~/.rearm/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RearmConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub skill: SkillConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
}

impl RearmConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RearmConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RearmError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database and the API token.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.rearm/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Delay queue consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How often the worker polls for due messages.
    pub poll_interval_ms: u64,
    /// How long a received message stays hidden before redelivery.
    pub visibility_timeout_secs: u64,
    /// Deliveries after which a message is dead-lettered.
    pub max_receives: u32,
    /// Messages claimed per poll.
    pub batch_size: usize,
    /// Deliveries reconciled concurrently.
    pub max_in_flight: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            // Twice the worst-case apply loop (6 attempts, 5 s apart, plus I/O).
            visibility_timeout_secs: 240,
            max_receives: 5,
            batch_size: 10,
            max_in_flight: 16,
        }
    }
}

/// Actuator retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff_secs: 5,
        }
    }
}

/// Voice skill settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillConfig {
    /// ISO-8601 duration used when the user gives no delay.
    pub default_delay: String,
    /// Name shown in the vendor's control center for our sessions.
    pub control_center_name: String,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            default_delay: "PT3M".to_string(),
            control_center_name: "Rearm Listener".to_string(),
        }
    }
}

/// Which actuator backend to drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Backend kind. Only "simulated" ships in-tree.
    pub kind: String,
    /// Starting mode of simulated locations.
    pub initial_mode: Mode,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: "simulated".to_string(),
            initial_mode: Mode::Away,
        }
    }
}
