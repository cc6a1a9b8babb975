use thiserror::Error;

/// Errors surfaced by the watchdog, its configuration, and calibration.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// Thresholds out of range or misordered, non-positive window, or an
    /// unparseable config file. Never clamped.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Calibration corpus too small or missing one of the two outcome classes.
    #[error(
        "insufficient calibration data: {runs} run(s) ({successes} succeeded, {failures} failed), need at least {min_runs} with both outcomes"
    )]
    InsufficientData {
        runs: usize,
        successes: usize,
        failures: usize,
        min_runs: usize,
    },

    /// A raw action that cannot be logged (e.g. JSON `null`).
    #[error("invalid action: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
