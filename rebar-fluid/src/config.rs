//! Fluid network configuration.

use serde::Deserialize;
use std::{fs, io, path::Path, sync::LazyLock, time::Duration};
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../package-content/rebar_config.json5");

/// Where [`REBAR_CONFIG`] is read from, relative to the working directory.
pub const CONFIG_PATH: &str = "config/rebar_config.json5";

/// Process-wide configuration, loaded (or created) on first access.
///
/// Falls back to [`FluidConfig::default`] if the file can't be read or is invalid.
pub static REBAR_CONFIG: LazyLock<FluidConfig> =
    LazyLock::new(|| match FluidConfig::load_or_create(Path::new(CONFIG_PATH)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load {CONFIG_PATH}, using defaults: {e}");
            FluidConfig::default()
        }
    });

/// Errors that can occur while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid JSON5 or does not match the schema.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json5::Error),
    /// The file parsed but contains an unusable value.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Settings of the fluid network simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FluidConfig {
    /// Host ticks between two runs of a segment's ticker.
    pub tick_interval: u32,
    /// Host ticks per real-time second. Fixed at 20 for Minecraft-like hosts.
    pub ticks_per_second: u32,
}

impl FluidConfig {
    /// Loads the config at `path`, writing the bundled default there first if it
    /// doesn't exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let config_str = fs::read_to_string(path)?;
            Self::parse(&config_str)
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_CONFIG)?;
            log::info!("Created default fluid config at {}", path.display());
            Ok(Self::default())
        }
    }

    /// Parses and validates a JSON5 document.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let config: FluidConfig = serde_json5::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval == 0 {
            return Err(ConfigError::Invalid("tick_interval must be at least 1"));
        }
        if self.ticks_per_second == 0 {
            return Err(ConfigError::Invalid("ticks_per_second must be at least 1"));
        }
        Ok(())
    }

    /// Wall-clock time between two runs of a segment's ticker.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.tick_interval)) / self.ticks_per_second
    }

    /// How much fluid a segment capped at `fluid_per_second` may move in one tick.
    #[must_use]
    pub fn tick_budget(&self, fluid_per_second: f64) -> f64 {
        fluid_per_second * f64::from(self.tick_interval) / f64::from(self.ticks_per_second)
    }
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            tick_interval: 10,
            ticks_per_second: 20,
        }
    }
}
