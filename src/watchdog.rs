use crate::action_log::ActionLog;
use crate::calibrate::{self, Calibration, CalibrationOptions, LabeledRun};
use crate::classify::{Status, Thresholds};
use crate::config::WatchdogConfig;
use crate::error::WatchdogError;
use crate::freshness::{self, FreshnessResult};
use crate::normalize::{self, FirstSegment, Normalizer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Outcome of one audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResult {
    pub status: Status,
    pub freshness: FreshnessResult,
    pub burn_rate: f64,
    pub recommendation: &'static str,
    pub thresholds: Thresholds,
    /// Fewer actions than `min_steps` were scored; status held at GREEN.
    pub warming_up: bool,
}

/// Freshness monitor for a single agent run.
///
/// Owns its log exclusively: one instance per monitored agent. The host's
/// control loop calls [`Watchdog::log_action`] after every step and
/// [`Watchdog::audit`] whenever it wants a verdict; acting on RED is the
/// host's job.
pub struct Watchdog {
    log: ActionLog,
    thresholds: Thresholds,
    window_size: usize,
    min_steps: usize,
    calibration: CalibrationOptions,
    normalizer: Box<dyn Normalizer>,
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("log_len", &self.log.len())
            .field("thresholds", &self.thresholds)
            .field("window_size", &self.window_size)
            .field("min_steps", &self.min_steps)
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    /// Create a watchdog with the default first-segment normalizer.
    pub fn new(config: &WatchdogConfig) -> Result<Self, WatchdogError> {
        Self::with_normalizer(config, Box::new(FirstSegment))
    }

    /// Create a watchdog that normalizes actions with a custom dialect.
    pub fn with_normalizer(
        config: &WatchdogConfig,
        normalizer: Box<dyn Normalizer>,
    ) -> Result<Self, WatchdogError> {
        let thresholds = config.validate()?;
        Ok(Self {
            log: ActionLog::new(),
            thresholds,
            window_size: config.window_size,
            min_steps: config.min_steps,
            calibration: config.calibration_options(),
            normalizer,
        })
    }

    /// Normalize a raw action and append it to the log.
    ///
    /// A JSON `null` is rejected and leaves the log unchanged.
    pub fn log_action(&mut self, action: impl Into<Value>) -> Result<(), WatchdogError> {
        let token = normalize::normalize_raw(self.normalizer.as_ref(), &action.into())?;
        self.log.append(token);
        Ok(())
    }

    /// Score the log (trailing window or whole history) and classify it.
    pub fn audit(&self, use_window: bool) -> StatusResult {
        let freshness = if use_window {
            freshness::windowed(&self.log, self.window_size)
        } else {
            freshness::global(&self.log)
        };

        let warming_up = freshness.span < self.min_steps;
        let status = if warming_up {
            Status::Green
        } else {
            self.thresholds.classify(freshness.ratio)
        };

        debug!(
            status = %status,
            ratio = freshness.ratio,
            span = freshness.span,
            warming_up,
            "audit"
        );
        if status == Status::Red {
            warn!(
                ratio = freshness.ratio,
                kill_threshold = self.thresholds.kill(),
                "freshness below kill threshold"
            );
        }

        StatusResult {
            status,
            freshness,
            burn_rate: freshness.burn_rate(),
            recommendation: status.recommendation(),
            thresholds: self.thresholds,
            warming_up,
        }
    }

    /// Clear the log so this instance can monitor a new, independent run.
    pub fn reset(&mut self) {
        self.log.reset();
    }

    /// Replace the thresholds, e.g. with a calibrated kill threshold.
    pub fn reconfigure(&mut self, thresholds: Thresholds) {
        debug!(
            kill = thresholds.kill(),
            amber = thresholds.amber(),
            "thresholds reconfigured"
        );
        self.thresholds = thresholds;
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Fit a kill threshold from labeled runs. Independent of any live
    /// instance.
    pub fn calibrate(
        runs: &[LabeledRun],
        window_size: Option<usize>,
    ) -> Result<f64, WatchdogError> {
        calibrate::calibrate(runs, window_size)
    }

    /// Fit a kill threshold the way this instance audits: its normalizer,
    /// its window (unless `[calibration]` set one), and its warm-up.
    pub fn calibrate_with(&self, runs: &[LabeledRun]) -> Result<Calibration, WatchdogError> {
        self.calibrate_with_options(runs, &self.calibration)
    }

    /// Fit a kill threshold with explicit options and this instance's
    /// normalizer.
    pub fn calibrate_with_options(
        &self,
        runs: &[LabeledRun],
        options: &CalibrationOptions,
    ) -> Result<Calibration, WatchdogError> {
        calibrate::calibrate_report(runs, options, self.normalizer.as_ref())
    }

    pub fn calibration_options(&self) -> &CalibrationOptions {
        &self.calibration
    }
}
