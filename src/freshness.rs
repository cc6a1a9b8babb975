//! Freshness scoring: distinct tokens / total tokens over a scope.
//!
//! The same formula serves the global scope (whole log) and the windowed
//! scope (trailing `window_size` tokens). An empty scope scores 1.0 so a run
//! that has only just started never reads as looping.

use crate::action_log::ActionLog;
use crate::normalize::ActionToken;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Which part of the log a score was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Windowed { window_size: usize },
}

/// One freshness computation. Never cached; the log may grow between audits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FreshnessResult {
    /// Unrounded ratio in [0, 1].
    pub ratio: f64,
    /// Number of tokens actually scored. Smaller than the configured window
    /// early in a run.
    pub span: usize,
    pub scope: Scope,
}

impl FreshnessResult {
    /// `1 - ratio`: the share of the scope spent on repeats.
    pub fn burn_rate(&self) -> f64 {
        1.0 - self.ratio
    }

    /// True when a windowed result scored a full window. Global results are
    /// always saturated.
    pub fn is_saturated(&self) -> bool {
        match self.scope {
            Scope::Global => true,
            Scope::Windowed { window_size } => self.span >= window_size,
        }
    }
}

impl fmt::Display for FreshnessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Global => write!(f, "{:.3} (global, {} actions)", self.ratio, self.span),
            Scope::Windowed { window_size } => write!(
                f,
                "{:.3} (window {}/{})",
                self.ratio, self.span, window_size
            ),
        }
    }
}

/// Distinct / total for `tokens`; 1.0 when empty.
pub fn score(tokens: &[ActionToken]) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }
    let distinct: HashSet<&ActionToken> = tokens.iter().collect();
    distinct.len() as f64 / tokens.len() as f64
}

/// Freshness over the whole log.
pub fn global(log: &ActionLog) -> FreshnessResult {
    let tokens = log.full();
    FreshnessResult {
        ratio: score(tokens),
        span: tokens.len(),
        scope: Scope::Global,
    }
}

/// Freshness over the trailing `window_size` tokens of the log.
pub fn windowed(log: &ActionLog, window_size: usize) -> FreshnessResult {
    let tokens = log.window(window_size);
    FreshnessResult {
        ratio: score(tokens),
        span: tokens.len(),
        scope: Scope::Windowed { window_size },
    }
}

/// Windowed freshness evaluated after every step of `tokens`.
///
/// Element `i` is the score of `tokens[i + 1 - min(i + 1, window_size)..=i]`.
/// Maintains a sliding multiset so the whole trajectory costs O(len).
/// A zero window scores nothing and yields an empty trajectory.
pub fn trajectory(tokens: &[ActionToken], window_size: usize) -> Vec<f64> {
    if window_size == 0 {
        return Vec::new();
    }
    let mut counts: HashMap<&ActionToken, usize> = HashMap::new();
    let mut out = Vec::with_capacity(tokens.len());

    for (i, token) in tokens.iter().enumerate() {
        *counts.entry(token).or_insert(0) += 1;

        if i >= window_size {
            let evicted = &tokens[i - window_size];
            if let Some(count) = counts.get_mut(evicted) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(evicted);
                }
            }
        }

        let span = (i + 1).min(window_size);
        out.push(counts.len() as f64 / span as f64);
    }

    out
}

/// The lowest windowed freshness a run reached once its window held at
/// least `min_steps` actions; 1.0 if it never got there.
pub fn min_windowed(tokens: &[ActionToken], window_size: usize, min_steps: usize) -> f64 {
    trajectory(tokens, window_size)
        .into_iter()
        .enumerate()
        .filter(|&(i, _)| (i + 1).min(window_size) >= min_steps)
        .fold(1.0, |min, (_, ratio)| min.min(ratio))
}
