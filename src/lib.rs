//! Freshness-based zombie-loop detection for autonomous agents.
//!
//! A [`Watchdog`] normalizes each action an agent takes, keeps them in an
//! append-only [`ActionLog`], and on audit reduces the log to a freshness
//! ratio (distinct / total actions, over the whole run or a trailing window)
//! classified as GREEN, AMBER, or RED. [`calibrate()`] fits the kill threshold
//! to an agent's dialect from labeled historical runs.

pub mod action_log;
pub mod calibrate;
pub mod classify;
pub mod config;
pub mod error;
pub mod freshness;
pub mod normalize;
pub mod watchdog;

pub use action_log::ActionLog;
pub use calibrate::{calibrate, Calibration, CalibrationOptions, LabeledRun, Objective};
pub use classify::{Status, Thresholds};
pub use config::WatchdogConfig;
pub use error::WatchdogError;
pub use freshness::FreshnessResult;
pub use normalize::{ActionToken, FirstSegment, Normalizer};
pub use watchdog::{StatusResult, Watchdog};
