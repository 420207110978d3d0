//! Per-operation cancellation and deadline.

use super::error::{Result, TeamError};
use super::types::UserId;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context passed to every public team operation.
///
/// Cancelling the token or passing the deadline drops the in-flight
/// operation. The transaction handle it owns is dropped with it, which rolls
/// the transaction back.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    actor_id: Option<UserId>,
}

impl OpContext {
    /// A context that never cancels and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Fail with [`TeamError::DeadlineExceeded`] at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail with [`TeamError::DeadlineExceeded`] after `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Record who performs the operation, for the audit trail.
    #[must_use]
    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn actor_id(&self) -> Option<UserId> {
        self.actor_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `operation` until it completes, the token fires or the deadline passes.
    ///
    /// `default_timeout` applies only when the context has no deadline of its own.
    pub async fn run<T, F>(&self, default_timeout: Option<Duration>, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.token.is_cancelled() {
            return Err(TeamError::Cancelled);
        }

        let deadline = self
            .deadline
            .or_else(|| default_timeout.map(|timeout| Instant::now() + timeout));
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TeamError::Cancelled),
            _ = expired => Err(TeamError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = OpContext::new();
        let value = ctx.run(None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OpContext::new().with_cancellation(token);

        let result = ctx.run(None, async { Ok(()) }).await;
        assert!(matches!(result, Err(TeamError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_cancelled_while_pending() {
        let token = CancellationToken::new();
        let ctx = OpContext::new().with_cancellation(token.clone());

        let handle = tokio::spawn(async move {
            ctx.run(None, async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
        });
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TeamError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_exceeded() {
        let ctx = OpContext::new().with_timeout(Duration::from_millis(50));

        let result = ctx
            .run(None, async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TeamError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_without_deadline() {
        let ctx = OpContext::new();

        let result = ctx
            .run(Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TeamError::DeadlineExceeded)));
    }

    #[test]
    fn test_actor() {
        let ctx = OpContext::new().with_actor(5);
        assert_eq!(ctx.actor_id(), Some(5));
        assert!(OpContext::new().actor_id().is_none());
    }
}
