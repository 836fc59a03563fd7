// src/config.rs
//! Configuration management for the tracking engine

use crate::error::{Result, TrackerError};
use crate::track::validator::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the assignment/route backend
    pub backend_url: String,
    /// Third-party fleet-GPS endpoint (Basic Auth), if the vehicle is
    /// tracked by the provider instead of the device itself
    pub fleet_api_url: Option<String>,
    pub fleet_api_username: Option<String>,
    pub fleet_api_password: Option<String>,
    /// Fixed timeout for every backend request, in seconds
    pub request_timeout_secs: u64,
    /// Poll interval for the fleet-GPS source, in seconds
    pub fleet_poll_interval_secs: u64,
    /// Validator: movement below this is GPS jitter
    pub min_movement_meters: f64,
    /// Validator: rejection ceiling in km/h (see ValidationPolicy)
    pub max_plausible_speed_kmh: f64,
    /// Coordinate used when the position source fails or is denied
    pub default_latitude: f64,
    pub default_longitude: f64,
    /// Directory for the durable queue documents; defaults under $HOME
    pub data_dir: Option<PathBuf>,
    /// Number of distinct segment colors to cycle through
    pub palette_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080/api".to_string(),
            fleet_api_url: None,
            fleet_api_username: None,
            fleet_api_password: None,
            request_timeout_secs: 15,
            fleet_poll_interval_secs: 30,
            min_movement_meters: 20.0,
            max_plausible_speed_kmh: 90_000.0,
            default_latitude: 47.3769,
            default_longitude: 8.5417,
            data_dir: None,
            palette_size: 6,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the config file, falling back to defaults
    /// when it does not exist
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| TrackerError::Other(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TrackerError::Other(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to the config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::Other(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::Other(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&config_path, contents)
            .map_err(|e| TrackerError::Other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TrackerError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("fleet-tracker")
            .join("config.json"))
    }

    /// Validator thresholds derived from this config
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            min_movement_meters: self.min_movement_meters,
            max_plausible_speed_kmh: self.max_plausible_speed_kmh,
        }
    }

    /// Resolved data directory for the durable queue
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        let home = std::env::var("HOME")
            .map_err(|_| TrackerError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("fleet-tracker"))
    }
}
