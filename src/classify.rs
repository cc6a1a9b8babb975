use crate::error::WatchdogError;
use serde::Serialize;
use std::fmt;

/// Kill threshold used when none is configured or calibrated.
pub const DEFAULT_KILL_THRESHOLD: f64 = 0.25;

/// Derived amber threshold = kill threshold × this, capped at 1.0.
pub const AMBER_MULTIPLIER: f64 = 2.0;

/// Three-level health signal for a monitored run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Green,
    Amber,
    Red,
}

impl Status {
    /// Short action hint for the supervising process.
    pub fn recommendation(self) -> &'static str {
        match self {
            Status::Green => "HEALTHY",
            Status::Amber => "WARN: DRIFT",
            Status::Red => "KILL RUN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Green => "GREEN",
            Status::Amber => "AMBER",
            Status::Red => "RED",
        })
    }
}

/// Validated classification boundaries.
///
/// Invariant: `0 <= kill <= amber <= 1`, both finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    kill: f64,
    amber: f64,
}

impl Thresholds {
    /// Build thresholds from a kill threshold and an optional amber threshold.
    /// When `amber` is `None` it is derived as `min(kill * 2, 1.0)`.
    pub fn new(kill: f64, amber: Option<f64>) -> Result<Self, WatchdogError> {
        check_unit("kill_threshold", kill)?;
        let amber = match amber {
            Some(a) => {
                check_unit("amber_threshold", a)?;
                a
            }
            None => (kill * AMBER_MULTIPLIER).min(1.0),
        };
        if amber < kill {
            return Err(WatchdogError::Configuration(format!(
                "amber_threshold ({amber}) must be >= kill_threshold ({kill})"
            )));
        }
        Ok(Self { kill, amber })
    }

    pub fn kill(&self) -> f64 {
        self.kill
    }

    pub fn amber(&self) -> f64 {
        self.amber
    }

    pub fn classify(&self, ratio: f64) -> Status {
        classify(ratio, self.kill, self.amber)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            kill: DEFAULT_KILL_THRESHOLD,
            amber: (DEFAULT_KILL_THRESHOLD * AMBER_MULTIPLIER).min(1.0),
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), WatchdogError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(WatchdogError::Configuration(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Map a freshness ratio onto a status.
///
/// Both thresholds are inclusive lower bounds of their tier: a ratio equal to
/// `kill` is AMBER and a ratio equal to `amber` is GREEN.
pub fn classify(ratio: f64, kill: f64, amber: f64) -> Status {
    if ratio < kill {
        Status::Red
    } else if ratio < amber {
        Status::Amber
    } else {
        Status::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers() {
        assert_eq!(classify(0.1, 0.25, 0.5), Status::Red);
        assert_eq!(classify(0.3, 0.25, 0.5), Status::Amber);
        assert_eq!(classify(0.9, 0.25, 0.5), Status::Green);
    }

    #[test]
    fn test_kill_boundary_is_amber() {
        assert_eq!(classify(0.25, 0.25, 0.5), Status::Amber);
    }

    #[test]
    fn test_amber_boundary_is_green() {
        assert_eq!(classify(0.5, 0.25, 0.5), Status::Green);
    }

    #[test]
    fn test_equal_thresholds_skip_amber() {
        assert_eq!(classify(0.39, 0.4, 0.4), Status::Red);
        assert_eq!(classify(0.4, 0.4, 0.4), Status::Green);
    }

    #[test]
    fn test_derived_amber_doubles_kill() {
        let t = Thresholds::new(0.25, None).unwrap();
        assert_eq!(t.amber(), 0.5);
        assert_eq!(t, Thresholds::default());
    }

    #[test]
    fn test_derived_amber_capped_at_one() {
        let t = Thresholds::new(0.7, None).unwrap();
        assert_eq!(t.amber(), 1.0);
    }

    #[test]
    fn test_rejects_amber_below_kill() {
        let err = Thresholds::new(0.4, Some(0.3)).unwrap_err();
        assert!(matches!(err, WatchdogError::Configuration(_)));
    }

    #[test]
    fn test_rejects_out_of_range_and_nan() {
        assert!(Thresholds::new(-0.1, None).is_err());
        assert!(Thresholds::new(1.5, None).is_err());
        assert!(Thresholds::new(0.2, Some(1.01)).is_err());
        assert!(Thresholds::new(f64::NAN, None).is_err());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::Red.to_string(), "RED");
        assert_eq!(Status::Red.recommendation(), "KILL RUN");
        assert_eq!(serde_json::to_string(&Status::Amber).unwrap(), "\"AMBER\"");
    }
}
