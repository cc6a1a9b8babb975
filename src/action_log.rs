use crate::normalize::ActionToken;

/// Ordered, append-only history of normalized actions for one monitored run.
///
/// Windowing is a read-time view over the tail; nothing is ever removed
/// except by [`ActionLog::reset`].
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    tokens: Vec<ActionToken>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one token to the end of the history.
    pub fn append(&mut self, token: ActionToken) {
        self.tokens.push(token);
    }

    /// The entire history in occurrence order.
    pub fn full(&self) -> &[ActionToken] {
        &self.tokens
    }

    /// The last `min(size, len)` tokens in occurrence order.
    pub fn window(&self, size: usize) -> &[ActionToken] {
        let start = self.tokens.len().saturating_sub(size);
        &self.tokens[start..]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Clear the history so the log can be reused for an independent run.
    pub fn reset(&mut self) {
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(items: &[&str]) -> ActionLog {
        let mut log = ActionLog::new();
        for item in items {
            log.append(ActionToken::new(*item));
        }
        log
    }

    fn strs(tokens: &[ActionToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.as_str()).collect()
    }

    #[test]
    fn test_append_preserves_order() {
        let log = log_of(&["read", "edit", "test"]);
        assert_eq!(strs(log.full()), vec!["read", "edit", "test"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_window_returns_tail() {
        let log = log_of(&["a", "b", "c", "d", "e"]);
        assert_eq!(strs(log.window(2)), vec!["d", "e"]);
    }

    #[test]
    fn test_window_larger_than_log_returns_everything() {
        let log = log_of(&["a", "b"]);
        assert_eq!(strs(log.window(15)), vec!["a", "b"]);
    }

    #[test]
    fn test_window_on_empty_log() {
        let log = ActionLog::new();
        assert!(log.window(15).is_empty());
        assert!(log.full().is_empty());
    }

    #[test]
    fn test_windowing_does_not_mutate() {
        let log = log_of(&["a", "b", "c"]);
        let _ = log.window(1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let mut log = log_of(&["a", "b"]);
        log.reset();
        assert!(log.is_empty());
        log.append(ActionToken::new("c"));
        assert_eq!(strs(log.full()), vec!["c"]);
    }
}
