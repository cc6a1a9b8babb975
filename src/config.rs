use crate::calibrate::{CalibrationOptions, Objective, DEFAULT_MIN_RUNS, DEFAULT_WINDOW_SIZE};
use crate::classify::{Thresholds, DEFAULT_KILL_THRESHOLD};
use crate::error::WatchdogError;
use serde::Deserialize;
use std::path::Path;

/// Construction-time configuration, optionally loaded from `watchdog.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub kill_threshold: f64,
    /// Derived from `kill_threshold` when absent.
    pub amber_threshold: Option<f64>,
    pub window_size: usize,
    /// Audits over fewer actions than this report GREEN. 0 disables.
    pub min_steps: usize,
    pub calibration: CalibrationConfig,
}

/// The `[calibration]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Falls back to the top-level `window_size` when absent.
    pub window_size: Option<usize>,
    pub min_runs: usize,
    pub objective: Objective,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_size: None,
            min_runs: DEFAULT_MIN_RUNS,
            objective: Objective::default(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            kill_threshold: DEFAULT_KILL_THRESHOLD,
            amber_threshold: None,
            window_size: DEFAULT_WINDOW_SIZE,
            min_steps: 0,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl WatchdogConfig {
    /// Check every field and build the classifier thresholds.
    pub fn validate(&self) -> Result<Thresholds, WatchdogError> {
        if self.window_size == 0 {
            return Err(WatchdogError::Configuration(
                "window_size must be positive".to_string(),
            ));
        }
        if self.calibration.window_size == Some(0) {
            return Err(WatchdogError::Configuration(
                "calibration.window_size must be positive".to_string(),
            ));
        }
        Thresholds::new(self.kill_threshold, self.amber_threshold)
    }

    /// Calibration settings matching the live audit: the production window
    /// (unless `[calibration]` overrides it) and the same warm-up.
    pub fn calibration_options(&self) -> CalibrationOptions {
        CalibrationOptions {
            window_size: self.calibration.window_size.unwrap_or(self.window_size),
            min_steps: self.min_steps,
            min_runs: self.calibration.min_runs,
            objective: self.calibration.objective,
        }
    }
}

/// Load config from a TOML file. A missing file yields the defaults; any
/// other read failure or a parse error is returned.
pub fn load_config(path: &Path) -> Result<WatchdogConfig, WatchdogError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(WatchdogConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: WatchdogConfig = toml::from_str(&contents).map_err(|e| {
        WatchdogError::Configuration(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}
