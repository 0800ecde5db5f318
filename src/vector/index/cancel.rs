//! Cooperative cancellation for long-running index builds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AnnflowError, Result};

/// Shared flag checked by build workers between units of work.
///
/// Clones share the same flag, so a token handed to another thread can stop
/// a build running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`AnnflowError::Cancelled`] if cancellation was requested.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(AnnflowError::cancelled(format!(
                "index build cancelled during {stage}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check("setup").is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check("k-means"),
            Err(AnnflowError::Cancelled(_))
        ));
    }
}
