/// Cooperative cancellation shared between the caller, the walker and the
/// worker pool.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation flag with an optional deadline.
///
/// Clones share the flag. Tripping it stops traversal and keeps the pool from
/// starting new units; units already running finish and their records are
/// kept.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token sharing this flag that also expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            flag: self.flag.clone(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Clear a cancellation request. Clones see the cleared flag; a deadline
    /// is not affected.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn reset_clears_the_shared_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        clone.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn expired_deadline_counts_as_cancelled() {
        let token = CancelToken::new().with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[test]
    fn timeout_token_observes_parent_cancel() {
        let parent = CancelToken::new();
        let timed = parent.with_timeout(Duration::from_secs(3600));
        assert!(!timed.is_cancelled());
        parent.cancel();
        assert!(timed.is_cancelled());
    }
}
