//! Cancellation scope for requests.
//!
//! A [`Context`] pairs a [`CancellationToken`] with an optional deadline.
//! Builders race every suspension point of their execution against it, so a
//! request abandoned by its caller is reported as [`Error::Canceled`]
//! instead of a generic transport failure.
//!
//! Contexts derive from one another: [`Context::with_cancel`] creates a child
//! token (canceling the parent cancels the child, not the other way around)
//! and [`Context::with_timeout`] only ever narrows the deadline.
//!
//! [`Error::Canceled`]: crate::Error::Canceled

use crate::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The token was canceled.
    Canceled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Canceled => f.write_str("context canceled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done unless derived contexts narrow it.
    pub fn background() -> Self {
        Self::default()
    }

    /// Wrap an existing token.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context with its own child token.
    ///
    /// Canceling the returned token cancels only the derived context.
    pub fn with_cancel(&self) -> (Context, CancellationToken) {
        let token = self.token.child_token();
        let ctx = Context {
            token: token.clone(),
            deadline: self.deadline,
        };
        (ctx, token)
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline`, keeping any earlier one.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Context {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is live.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            Some(CancelReason::Canceled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is done.
    pub async fn done(&self) -> CancelReason {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.token.cancelled() => CancelReason::Canceled,
            () = deadline => CancelReason::DeadlineExceeded,
        }
    }

    /// Run `fut` until it completes or the context is done.
    ///
    /// A context that is already done never polls `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        if let Some(reason) = self.err() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Context::new(token)
    }
}

/// Race `fut` against a request context and an optional outer scope.
pub(crate) async fn guard<F: Future>(
    ctx: &Context,
    scope: Option<&Context>,
    fut: F,
) -> Result<F::Output, Error> {
    let inner = ctx.run(fut);
    let output = match scope {
        Some(outer) => outer.run(inner).await.and_then(|r| r),
        None => inner.await,
    };
    output.map_err(Error::Canceled)
}

/// The first reason either context is done.
pub(crate) fn first_err(ctx: &Context, scope: Option<&Context>) -> Option<CancelReason> {
    ctx.err().or_else(|| scope.and_then(Context::err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_done_wakes_on_cancel() {
        let (ctx, token) = Context::background().with_cancel();
        let mut done = task::spawn(async move { ctx.done().await });
        assert_pending!(done.poll());

        token.cancel();
        assert!(done.is_woken());
        assert_ready_eq!(done.poll(), CancelReason::Canceled);
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let (child, token) = parent.with_cancel();
        token.cancel();
        assert_eq!(child.err(), Some(CancelReason::Canceled));
        assert!(parent.err().is_none());

        let (grandchild, _) = parent.with_cancel();
        parent.token().cancel();
        assert_eq!(grandchild.err(), Some(CancelReason::Canceled));
    }

    #[tokio::test]
    async fn test_deadline_only_narrows() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let wider = ctx.with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), wider.deadline());

        assert_eq!(wider.done().await, CancelReason::DeadlineExceeded);
        assert_eq!(wider.err(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_run_skips_future_when_done() {
        let (ctx, token) = Context::background().with_cancel();
        token.cancel();
        let result = ctx.run(async { panic!("must not be polled") }).await;
        assert_eq!(result, Err(CancelReason::Canceled));
    }

    #[tokio::test]
    async fn test_guard_honours_outer_scope() {
        let (outer, token) = Context::background().with_cancel();
        token.cancel();
        let err = guard(&Context::background(), Some(&outer), async { 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Canceled(CancelReason::Canceled)));
        assert_eq!(
            first_err(&Context::background(), Some(&outer)),
            Some(CancelReason::Canceled)
        );
    }
}
