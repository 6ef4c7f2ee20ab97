//! Per-request cancellation context.
//!
//! # Responsibility
//! - Carry the caller's cancellation signal and optional deadline into every
//!   repository call.
//!
//! # Invariants
//! - Clones share one cancellation token; cancelling any clone cancels all
//!   of them.
//! - Children derived with `child_with_timeout` are cancelled with their
//!   parent, but cancelling a child leaves the parent live.
//! - Core never imposes its own timeout; it only honors the caller's.

use crate::error::{AppError, AppResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Context that is never cancelled unless `cancel` is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child context that keeps the tighter of the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(current) if current < candidate => current,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `Cancelled` once the token fires or the deadline has passed.
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(AppError::cancelled("operation cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AppError::cancelled("deadline exceeded"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn background_context_is_live() {
        assert!(Context::background().check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        ctx.cancel();
        let err = clone.check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn elapsed_deadline_is_reported_as_cancelled() {
        let ctx = Context::with_timeout(Duration::ZERO);
        let err = ctx.check().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.message(), "deadline exceeded");
    }

    #[test]
    fn parent_cancellation_reaches_children_only() {
        let parent = Context::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        child.cancel();
        assert!(child.is_cancelled());
        assert!(parent.check().is_ok());

        let sibling = parent.child_with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert_eq!(sibling.check().unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn child_keeps_the_tighter_deadline() {
        let parent = Context::with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
