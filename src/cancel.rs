//! Cooperative cancellation with an optional wall-clock budget.
//!
//! The importer checks the token at phase boundaries and inside tight inner
//! loops; filter iteration and search check it per step. Query paths never
//! block, so polling a flag is all the machinery needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Result, SnomedError};

/// Default wall-clock budget for a single expansion or search.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30);

/// Clonable cancellation handle shared between the caller and a running
/// import or query.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never expires on its own; cancellation is caller-driven.
    pub fn new() -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that additionally trips after `budget` of wall-clock time.
    pub fn with_budget(budget: Duration) -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    /// Request cancellation. Running work stops at its next probe.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Probe the token. `label` names the work in the resulting error.
    pub fn check(&self, label: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(SnomedError::Cancelled(label.to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(SnomedError::TooCostly(format!(
                    "{label} exceeded its time budget"
                )));
            }
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancelToken::new();
        assert!(token.check("import").is_ok());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_trips_check() {
        let token = CancelToken::new();
        token.cancel();
        let err = token.check("closure").unwrap_err();
        assert!(matches!(err, SnomedError::Cancelled(_)));
        assert!(err.to_string().contains("closure"));
    }

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_expired_budget_is_too_costly() {
        let token = CancelToken::with_budget(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        let err = token.check("expansion").unwrap_err();
        assert!(matches!(err, SnomedError::TooCostly(_)));
    }
}
