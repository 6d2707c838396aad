//! Cancellation and deadline propagation for engine operations
//!
//! Every store round-trip made by the engine is raced against the caller's
//! cancellation signal and deadline, so a caller can always tell "the token
//! is bad" apart from "the answer could not be determined in time".

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{DomainError, StoreError};

/// Caller-supplied execution context: a cancellation signal plus an optional deadline
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::background()
    }
}

impl OperationContext {
    /// Context that is never canceled and has no deadline
    pub fn background() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Context driven by an existing cancellation token
    pub fn from_token(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    /// Child context: canceled with its parent, with a deadline no later than
    /// the parent's
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => parent.min(candidate),
            None => candidate,
        };

        Self {
            cancellation: self.cancellation.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Underlying cancellation token, for handing to spawned work
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fail fast if the context is already canceled or past its deadline
    pub fn check(&self) -> Result<(), DomainError> {
        if self.cancellation.is_cancelled() {
            return Err(DomainError::Canceled);
        }
        if matches!(self.deadline, Some(deadline) if Instant::now() >= deadline) {
            return Err(DomainError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run a store operation under this context.
    ///
    /// The operation is not started when the context is already done, and is
    /// abandoned as soon as the context is canceled or its deadline passes.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.check()?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(DomainError::Canceled),
            _ = expired => Err(DomainError::DeadlineExceeded),
            result = operation => result.map_err(DomainError::from),
        }
    }
}
