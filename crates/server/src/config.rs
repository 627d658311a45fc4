//! Service configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the built-in simulated face module
pub const SIMULATED_MODULE: &str = "simulated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub device: DeviceSettings,
    /// Liveness mode persistence
    #[serde(default)]
    pub liveness: LivenessSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub log_level: String,
    /// Template directory handed to the device for the self-test user
    #[serde(default = "ServiceSettings::default_store_path")]
    pub store_path: String,
}

impl ServiceSettings {
    fn default_store_path() -> String {
        "/data/vendor/faceid/0".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Face module to open
    pub module: String,
    /// Behaviour of the simulated module
    #[serde(default)]
    pub simulated: SimulatedSettings,
}

/// Simulated face module configuration
///
/// # Example Configuration
/// ```toml
/// [device]
/// module = "simulated"
///
/// [device.simulated]
/// latency_ms = 20
/// enrolled = [5]
/// enroll_frames = 0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedSettings {
    /// Delay before the device reports a result
    #[serde(default = "SimulatedSettings::default_latency_ms")]
    pub latency_ms: u64,
    /// Face ids enrolled when the module opens
    #[serde(default)]
    pub enrolled: Vec<u32>,
    /// Authenticator id reported to clients
    #[serde(default = "SimulatedSettings::default_authenticator_id")]
    pub authenticator_id: u64,
    /// Continuation frames an enrollment needs (0 = finish without frames)
    #[serde(default)]
    pub enroll_frames: u32,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            latency_ms: Self::default_latency_ms(),
            enrolled: Vec::new(),
            authenticator_id: Self::default_authenticator_id(),
            enroll_frames: 0,
        }
    }
}

impl SimulatedSettings {
    fn default_latency_ms() -> u64 {
        20
    }

    fn default_authenticator_id() -> u64 {
        0x0fac_e1d0
    }
}

/// Liveness mode store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LivenessSettings {
    /// TOML file holding liveness modes (None = keep them in memory)
    #[serde(default)]
    pub store: Option<String>,
}

impl LivenessSettings {
    /// Store path with `~` expanded
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store
            .as_deref()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings {
                log_level: "info".to_string(),
                store_path: ServiceSettings::default_store_path(),
            },
            device: DeviceSettings {
                module: SIMULATED_MODULE.to_string(),
                simulated: SimulatedSettings::default(),
            },
            liveness: LivenessSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/face-hal/service.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServiceConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("face-hal").join("service.toml")
        } else {
            PathBuf::from(".config/face-hal/service.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.service.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.service.log_level,
                valid_levels.join(", ")
            ));
        }

        Self::validate_store_path(&self.service.store_path)?;

        if self.device.module != SIMULATED_MODULE {
            return Err(anyhow!(
                "Unknown face module '{}', available: {}",
                self.device.module,
                SIMULATED_MODULE
            ));
        }

        if self.device.simulated.enrolled.contains(&0) {
            return Err(anyhow!("Face id 0 is reserved and cannot be pre-enrolled"));
        }

        if let Some(store) = &self.liveness.store {
            if store.trim().is_empty() {
                return Err(anyhow!("Empty liveness store path"));
            }
        }

        Ok(())
    }

    /// Validate an active-user store path length
    pub fn validate_store_path(path: &str) -> Result<()> {
        protocol::validate_store_path(path)
            .with_context(|| format!("Invalid store path '{}'", path))
    }
}
