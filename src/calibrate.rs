//! Offline kill-threshold calibration from labeled historical runs.
//!
//! Each run is reduced to the lowest windowed freshness it reached, which is
//! the moment a live audit would have caught it. A 1-D sweep over the observed
//! minima then picks the threshold whose kill/spare partition best matches
//! the success labels.
//!
//! Candidates are the midpoints between adjacent distinct minima plus one
//! candidate just below the lowest and one just above the highest (clamped to
//! [0, 1]). When several candidates share the best score, the one nearest the
//! midpoint of the tied span wins, and the lower one on an exact tie.

use crate::error::WatchdogError;
use crate::freshness;
use crate::normalize::{self, FirstSegment, Normalizer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Window size used when the caller does not pick one.
pub const DEFAULT_WINDOW_SIZE: usize = 15;

/// Smallest corpus accepted by default: one run of each outcome.
pub const DEFAULT_MIN_RUNS: usize = 2;

/// Offset applied to the extreme candidates.
const EDGE_EPSILON: f64 = 1e-6;

/// Scores within this distance are considered tied.
const SCORE_EPSILON: f64 = 1e-12;

/// One historical trajectory with its outcome.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LabeledRun {
    pub actions: Vec<Value>,
    pub success: bool,
}

impl LabeledRun {
    pub fn new<I, A>(actions: I, success: bool) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Value>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            success,
        }
    }
}

/// How a candidate threshold is scored against the labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Share of runs classified correctly.
    #[default]
    Accuracy,
    /// F-measure with "killed a failed run" as the positive class.
    F1,
    /// Accuracy minus a 2.5× penalty on killed successes and 1× on spared failures.
    AvoidKillingWinners,
}

/// Kill/spare outcome counts at one threshold. A failed run is the
/// positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    /// Failed runs that would have been killed.
    pub killed_failures: usize,
    /// Successful runs that would have been killed.
    pub killed_successes: usize,
    /// Failed runs that would have survived.
    pub spared_failures: usize,
    /// Successful runs that would have survived.
    pub spared_successes: usize,
}

impl Confusion {
    fn tally(minima: &[(f64, bool)], threshold: f64) -> Self {
        let mut c = Confusion::default();
        for &(min, success) in minima {
            match (min < threshold, success) {
                (true, false) => c.killed_failures += 1,
                (true, true) => c.killed_successes += 1,
                (false, false) => c.spared_failures += 1,
                (false, true) => c.spared_successes += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.killed_failures + self.killed_successes + self.spared_failures + self.spared_successes
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.killed_failures + self.spared_successes) as f64 / total as f64
    }

    pub fn f1(&self) -> f64 {
        let tp = self.killed_failures as f64;
        let denom = 2.0 * tp + self.killed_successes as f64 + self.spared_failures as f64;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * tp / denom
    }

    pub fn score(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Accuracy => self.accuracy(),
            Objective::F1 => self.f1(),
            Objective::AvoidKillingWinners => {
                let total = self.total().max(1) as f64;
                self.accuracy()
                    - 2.5 * (self.killed_successes as f64 / total)
                    - 1.0 * (self.spared_failures as f64 / total)
            }
        }
    }
}

/// Knobs for a calibration pass.
///
/// `window_size` and `min_steps` must match the live audit settings, or the
/// per-run minima will not be what a live audit would have seen.
/// `WatchdogConfig::calibration_options` fills them from the production config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    pub window_size: usize,
    /// Steps whose window holds fewer actions than this are ignored, as the
    /// live audit holds them at GREEN.
    pub min_steps: usize,
    pub min_runs: usize,
    pub objective: Objective,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            min_steps: 0,
            min_runs: DEFAULT_MIN_RUNS,
            objective: Objective::default(),
        }
    }
}

/// The outcome of a calibration pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    /// Fitted kill threshold.
    pub threshold: f64,
    /// Objective value at `threshold`.
    pub score: f64,
    pub confusion: Confusion,
    /// Lowest windowed freshness per run, in input order.
    pub run_minima: Vec<f64>,
}

/// Fit a kill threshold with the default normalizer and objective.
pub fn calibrate(runs: &[LabeledRun], window_size: Option<usize>) -> Result<f64, WatchdogError> {
    let options = CalibrationOptions {
        window_size: window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
        ..CalibrationOptions::default()
    };
    calibrate_report(runs, &options, &FirstSegment).map(|c| c.threshold)
}

/// Fit a kill threshold and return the full report.
pub fn calibrate_report(
    runs: &[LabeledRun],
    options: &CalibrationOptions,
    normalizer: &dyn Normalizer,
) -> Result<Calibration, WatchdogError> {
    if options.window_size == 0 {
        return Err(WatchdogError::Configuration(
            "window_size must be positive".to_string(),
        ));
    }

    let successes = runs.iter().filter(|r| r.success).count();
    let failures = runs.len() - successes;
    if successes == 0 || failures == 0 || runs.len() < options.min_runs {
        return Err(WatchdogError::InsufficientData {
            runs: runs.len(),
            successes,
            failures,
            min_runs: options.min_runs,
        });
    }

    let mut minima = Vec::with_capacity(runs.len());
    for run in runs {
        let tokens = run
            .actions
            .iter()
            .map(|raw| normalize::normalize_raw(normalizer, raw))
            .collect::<Result<Vec<_>, _>>()?;
        let min = freshness::min_windowed(&tokens, options.window_size, options.min_steps);
        minima.push((min, run.success));
    }

    let candidates = candidate_thresholds(&minima);

    let mut best_score = f64::NEG_INFINITY;
    let mut tied: Vec<f64> = Vec::new();
    for &candidate in &candidates {
        let score = Confusion::tally(&minima, candidate).score(options.objective);
        debug!(candidate, score, "calibration candidate");
        if score > best_score + SCORE_EPSILON {
            best_score = score;
            tied.clear();
            tied.push(candidate);
        } else if (score - best_score).abs() <= SCORE_EPSILON {
            tied.push(candidate);
        }
    }

    let threshold = break_tie(&tied);
    let confusion = Confusion::tally(&minima, threshold);
    let score = confusion.score(options.objective);

    info!(
        threshold,
        score,
        runs = runs.len(),
        window_size = options.window_size,
        min_steps = options.min_steps,
        objective = ?options.objective,
        "calibrated kill threshold"
    );

    Ok(Calibration {
        threshold,
        score,
        confusion,
        run_minima: minima.into_iter().map(|(min, _)| min).collect(),
    })
}

/// Sorted candidate thresholds, one per distinct kill/spare partition.
fn candidate_thresholds(minima: &[(f64, bool)]) -> Vec<f64> {
    let mut values: Vec<f64> = minima.iter().map(|&(min, _)| min).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();

    let mut candidates = Vec::with_capacity(values.len() + 1);
    if let (Some(&lowest), Some(&highest)) = (values.first(), values.last()) {
        candidates.push((lowest - EDGE_EPSILON).max(0.0));
        candidates.extend(values.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0));
        candidates.push((highest + EDGE_EPSILON).min(1.0));
    }
    candidates.dedup();
    candidates
}

/// Pick the tied candidate nearest the midpoint of the tied span.
/// `tied` is in ascending order, so the lower candidate wins exact ties.
fn break_tie(tied: &[f64]) -> f64 {
    let (Some(&lo), Some(&hi)) = (tied.first(), tied.last()) else {
        return crate::classify::DEFAULT_KILL_THRESHOLD;
    };
    let mid = (lo + hi) / 2.0;
    tied.iter()
        .copied()
        .fold((lo, f64::INFINITY), |(best, best_dist), c| {
            let dist = (c - mid).abs();
            if dist < best_dist {
                (c, dist)
            } else {
                (best, best_dist)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(actions: &[&str], success: bool) -> LabeledRun {
        LabeledRun::new(actions.iter().copied(), success)
    }

    fn two_run_corpus() -> Vec<LabeledRun> {
        vec![
            run(&["ls", "ls", "ls", "ls"], false),
            run(&["read", "edit", "test", "edit", "test"], true),
        ]
    }

    #[test]
    fn test_separates_loop_from_edit_test_cycle() {
        let threshold = calibrate(&two_run_corpus(), None).unwrap();
        assert!(threshold > 0.25 && threshold < 0.6, "got {threshold}");
    }

    #[test]
    fn test_picks_midpoint_between_classes() {
        let threshold = calibrate(&two_run_corpus(), Some(15)).unwrap();
        assert!((threshold - 0.425).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let corpus = two_run_corpus();
        let a = calibrate(&corpus, None).unwrap();
        let b = calibrate(&corpus, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_success_is_insufficient() {
        let corpus = vec![run(&["a", "b"], true), run(&["c", "d"], true)];
        let err = calibrate(&corpus, None).unwrap_err();
        assert!(matches!(
            err,
            WatchdogError::InsufficientData { successes: 2, failures: 0, .. }
        ));
    }

    #[test]
    fn test_all_failure_is_insufficient() {
        let corpus = vec![run(&["a", "a"], false), run(&["c", "c"], false)];
        assert!(matches!(
            calibrate(&corpus, None),
            Err(WatchdogError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_empty_corpus_is_insufficient() {
        assert!(matches!(
            calibrate(&[], None),
            Err(WatchdogError::InsufficientData { runs: 0, .. })
        ));
    }

    #[test]
    fn test_min_runs_enforced() {
        let options = CalibrationOptions {
            min_runs: 3,
            ..CalibrationOptions::default()
        };
        let err = calibrate_report(&two_run_corpus(), &options, &FirstSegment).unwrap_err();
        assert!(matches!(err, WatchdogError::InsufficientData { min_runs: 3, .. }));
    }

    #[test]
    fn test_zero_window_is_configuration_error() {
        assert!(matches!(
            calibrate(&two_run_corpus(), Some(0)),
            Err(WatchdogError::Configuration(_))
        ));
    }

    #[test]
    fn test_null_action_is_invalid_input() {
        let corpus = vec![
            LabeledRun {
                actions: vec![Value::from("ls"), Value::Null],
                success: false,
            },
            run(&["read", "edit"], true),
        ];
        assert!(matches!(
            calibrate(&corpus, None),
            Err(WatchdogError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_size_changes_minima() {
        // Loop only visible inside a short window.
        let actions = ["a", "b", "c", "d", "e", "f", "x", "x", "x", "x"];
        let corpus = vec![run(&actions, false), run(&["a", "b", "c", "d"], true)];
        let wide = calibrate_report(&corpus, &CalibrationOptions::default(), &FirstSegment).unwrap();
        let narrow = calibrate_report(
            &corpus,
            &CalibrationOptions {
                window_size: 4,
                ..CalibrationOptions::default()
            },
            &FirstSegment,
        )
        .unwrap();
        assert!((wide.run_minima[0] - 0.7).abs() < 1e-12);
        assert_eq!(narrow.run_minima[0], 0.25);
        assert_eq!(narrow.confusion.killed_failures, 1);
        assert_eq!(narrow.confusion.spared_successes, 1);
    }

    #[test]
    fn test_min_steps_ignores_warm_up_dips() {
        // Early repeat at step 2 never leaves warm-up under min_steps = 5.
        let actions = ["edit", "edit", "read", "test", "plan", "ship", "a", "b", "c", "d"];
        let corpus = vec![run(&actions, true), run(&["ls"; 8], false)];

        let every_step =
            calibrate_report(&corpus, &CalibrationOptions::default(), &FirstSegment).unwrap();
        assert_eq!(every_step.run_minima[0], 0.5);

        let options = CalibrationOptions {
            min_steps: 5,
            ..CalibrationOptions::default()
        };
        let warmed = calibrate_report(&corpus, &options, &FirstSegment).unwrap();
        assert!((warmed.run_minima[0] - 0.8).abs() < 1e-12);
        assert_eq!(warmed.run_minima[1], 0.125);
    }

    #[test]
    fn test_run_shorter_than_min_steps_scores_one() {
        let options = CalibrationOptions {
            min_steps: 5,
            ..CalibrationOptions::default()
        };
        let corpus = vec![run(&["ls", "ls", "ls"], false), run(&["a", "b", "c", "d", "e"], true)];
        let report = calibrate_report(&corpus, &options, &FirstSegment).unwrap();
        assert_eq!(report.run_minima, vec![1.0, 1.0]);
    }

    #[test]
    fn test_report_confusion_and_score() {
        let corpus = vec![
            run(&["ls", "ls", "ls", "ls"], false),
            run(&["cat", "cat", "cat"], false),
            run(&["read", "edit", "test", "edit", "test"], true),
            run(&["plan", "read", "edit", "test"], true),
        ];
        let report = calibrate_report(&corpus, &CalibrationOptions::default(), &FirstSegment).unwrap();
        assert_eq!(report.score, 1.0);
        assert_eq!(report.confusion.killed_failures, 2);
        assert_eq!(report.confusion.spared_successes, 2);
        assert!(report.threshold > 1.0 / 3.0 && report.threshold < 0.6);
    }

    #[test]
    fn test_overlapping_classes_keep_best_accuracy() {
        // A successful run dips lower than one failed run; no threshold is perfect.
        let corpus = vec![
            run(&["ls", "ls", "ls", "ls"], false),
            run(&["a", "b", "a", "b"], false),
            run(&["x", "x", "y"], true),
            run(&["a", "b", "c", "d"], true),
        ];
        let report = calibrate_report(&corpus, &CalibrationOptions::default(), &FirstSegment).unwrap();
        assert_eq!(report.score, 0.75);
    }

    #[test]
    fn test_avoid_killing_winners_is_more_conservative() {
        let corpus = vec![
            run(&["ls", "ls", "ls", "ls"], false),
            run(&["a", "b", "a", "b"], false),
            run(&["x", "x", "y"], true),
            run(&["a", "b", "c", "d"], true),
        ];
        let accuracy = calibrate_report(&corpus, &CalibrationOptions::default(), &FirstSegment).unwrap();
        let cautious = calibrate_report(
            &corpus,
            &CalibrationOptions {
                objective: Objective::AvoidKillingWinners,
                ..CalibrationOptions::default()
            },
            &FirstSegment,
        )
        .unwrap();
        assert_eq!(cautious.confusion.killed_successes, 0);
        assert!(cautious.threshold <= accuracy.threshold);
    }

    #[test]
    fn test_f1_objective() {
        let options = CalibrationOptions {
            objective: Objective::F1,
            ..CalibrationOptions::default()
        };
        let report = calibrate_report(&two_run_corpus(), &options, &FirstSegment).unwrap();
        assert_eq!(report.score, 1.0);
        assert!(report.threshold > 0.25 && report.threshold < 0.6);
    }

    #[test]
    fn test_candidates_cover_every_partition() {
        let minima = [(0.2, false), (0.5, true), (0.5, true), (0.8, true)];
        let c = candidate_thresholds(&minima);
        assert_eq!(c.len(), 4);
        assert!((c[0] - (0.2 - EDGE_EPSILON)).abs() < 1e-15);
        assert!((c[1] - 0.35).abs() < 1e-12);
        assert!((c[2] - 0.65).abs() < 1e-12);
        assert!((c[3] - (0.8 + EDGE_EPSILON)).abs() < 1e-15);
    }

    #[test]
    fn test_candidates_clamped_to_unit_interval() {
        let c = candidate_thresholds(&[(0.0, false), (1.0, true)]);
        assert_eq!(c, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_break_tie_prefers_middle() {
        assert_eq!(break_tie(&[0.1, 0.3, 0.5]), 0.3);
        assert_eq!(break_tie(&[0.1, 0.2, 0.4, 0.5]), 0.2);
        assert_eq!(break_tie(&[0.42]), 0.42);
    }
}
