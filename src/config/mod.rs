// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management
//!
//! The configuration is backed by a YAML file with one section per
//! subsystem. Every section falls back to its defaults when absent, so a
//! minimal file only needs the values that differ from the bench setup.
//! When the file does not exist, a default one is written in its place for
//! the operator to edit.
//!
//! ## Usage
//!
//! ```no_run
//! use furnace_control::config::Config;
//! use std::path::Path;
//!
//! let config = Config::from_file(Path::new("config.yaml")).unwrap();
//! println!("furnace PLC at {}", config.modbus.furnace_address);
//! ```

pub mod acquisition;
pub mod modbus;
pub mod telemetry;
pub mod triggers;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub use acquisition::AcquisitionConfig;
pub use modbus::ModbusConfig;
pub use telemetry::TelemetryConfig;
pub use triggers::{TimerConfig, TriggersConfig};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Modbus/TCP connection settings for both PLCs.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Telemetry stream settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Acquisition session and persistence settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Trigger timer settings.
    #[serde(default)]
    pub triggers: TriggersConfig,
}

impl Config {
    /// Load configuration from a file, creating a default one when the
    /// file does not exist.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("configuration not found at {path:?}, writing defaults");
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("loading configuration from {path:?}");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file at {path:?}"))?;
        let config: Config = serde_yml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML configuration from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create config directory {parent:?}"))?;
            }
        }
        let yaml = serde_yml::to_string(self).context("failed to serialize configuration")?;
        let mut file = File::create(path)
            .with_context(|| format!("failed to create config file at {path:?}"))?;
        file.write_all(yaml.as_bytes())
            .with_context(|| format!("failed to write configuration to {path:?}"))?;
        Ok(())
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.telemetry.sample_frequency_hz <= 0.0 {
            anyhow::bail!(
                "telemetry sample frequency must be positive, got {}",
                self.telemetry.sample_frequency_hz
            );
        }
        if self.acquisition.read_interval_ms == 0 {
            anyhow::bail!("acquisition read interval must be non-zero");
        }
        if self.acquisition.max_setpoint_step <= 0.0 {
            anyhow::bail!(
                "max setpoint step must be positive, got {}",
                self.acquisition.max_setpoint_step
            );
        }
        if self.triggers.timers.is_empty() {
            anyhow::bail!("at least one trigger timer must be configured");
        }
        for timer in &self.triggers.timers {
            if timer.frequency_hz <= 0.0 {
                anyhow::bail!(
                    "timer '{}' frequency must be positive, got {}",
                    timer.name,
                    timer.frequency_hz
                );
            }
        }
        if !self
            .triggers
            .timers
            .iter()
            .any(|t| t.name == self.triggers.reference)
        {
            anyhow::bail!(
                "reference timer '{}' is not in the timer list",
                self.triggers.reference
            );
        }
        Ok(())
    }

    /// Interval between register poll passes.
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.read_interval_ms)
    }

    /// Interval between telemetry receive attempts, half the sample period
    /// so the socket never backs up.
    pub fn stream_interval(&self) -> Duration {
        Duration::from_secs_f64(0.5 / self.telemetry.sample_frequency_hz)
    }

    /// Buffer flush threshold: one second's worth of samples.
    pub fn buffer_threshold(&self) -> usize {
        self.telemetry.sample_frequency_hz.round().max(1.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config::from_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.modbus.furnace_port, 502);
        assert_eq!(config.triggers.reference, "furnace");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "telemetry:\n  address: 10.0.0.5\n  port: 4444\n  sample_frequency_hz: 100.0\n  diagnostics: true\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.telemetry.address, "10.0.0.5");
        assert!(config.telemetry.diagnostics);
        // Untouched sections keep defaults.
        assert_eq!(config.acquisition.read_interval_ms, 500);
        assert_eq!(config.buffer_threshold(), 100);
        assert_eq!(config.stream_interval(), Duration::from_millis(5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.telemetry.sample_frequency_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.triggers.reference = "missing".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.triggers.timers[0].frequency_hz = -1.0;
        assert!(config.validate().is_err());
    }
}
