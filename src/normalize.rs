//! Action normalization: raw logged actions become canonical tokens.
//!
//! Arguments vary even when the kind of action repeats, so by default only
//! the first whitespace-delimited segment is kept:
//! `"read_file config.yaml"` and `"READ_FILE other.rs"` both become `read_file`.

use crate::error::WatchdogError;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// The canonical form of one logged action. Compared by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActionToken(String);

impl ActionToken {
    /// Sentinel produced for empty or whitespace-only actions.
    pub const EMPTY: &'static str = "";

    /// Wrap an already-canonical string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The empty-action sentinel token.
    pub fn empty() -> Self {
        Self(Self::EMPTY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.0 == Self::EMPTY
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduces the text of a raw action to a token.
///
/// Implementations must be pure and total: every input yields a token.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> ActionToken;
}

/// Default normalizer: lowercase, trim, keep the first whitespace segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSegment;

impl Normalizer for FirstSegment {
    fn normalize(&self, text: &str) -> ActionToken {
        match text.split_whitespace().next() {
            Some(head) => ActionToken(head.to_lowercase()),
            None => ActionToken::empty(),
        }
    }
}

/// Coerce a raw action value to text.
///
/// Strings pass through untouched; numbers and booleans use their textual
/// form; arrays and objects use compact JSON. `null` is rejected.
pub fn coerce_text(raw: &Value) -> Result<Cow<'_, str>, WatchdogError> {
    match raw {
        Value::Null => Err(WatchdogError::InvalidInput(
            "null action cannot be logged".to_string(),
        )),
        Value::String(s) => Ok(Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Ok(Cow::Owned(b.to_string())),
        Value::Number(n) => Ok(Cow::Owned(n.to_string())),
        other => Ok(Cow::Owned(other.to_string())),
    }
}

/// Coerce and normalize a raw action in one step.
pub fn normalize_raw(normalizer: &dyn Normalizer, raw: &Value) -> Result<ActionToken, WatchdogError> {
    let text = coerce_text(raw)?;
    Ok(normalizer.normalize(&text))
}
