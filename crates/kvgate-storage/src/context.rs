//! Request context carrying cancellation and a deadline.
//!
//! A `RequestContext` is created per inbound request and handed to every
//! point operation. Deriving a context with [`RequestContext::with_timeout`]
//! produces a child that is cancelled together with its parent and whose
//! deadline never extends past the parent's.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{StorageError, StorageResult};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The context (or one of its ancestors) was cancelled.
    Cancelled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl From<Interrupt> for StorageError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => StorageError::Cancelled,
            Interrupt::DeadlineExceeded => StorageError::DeadlineExceeded,
        }
    }
}

/// Cancellation token plus optional deadline.
///
/// Cloning is cheap and clones share the same cancellation state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A root context with no deadline that is never cancelled unless
    /// [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wraps an existing token, e.g. one tied to server shutdown.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derives a child context that expires after `timeout`.
    ///
    /// The effective deadline is the earlier of the parent's deadline and
    /// `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derives a child context with the same deadline that can be cancelled
    /// independently of the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The effective deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the interrupt reason if the context is already done.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.token.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Interrupt::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Interrupt::Cancelled
            }
        }
    }

    /// Runs `future` until it completes or the context is done, whichever
    /// happens first.
    ///
    /// A context that is already done fails fast without polling `future`.
    pub async fn run<T, F>(&self, future: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        if let Some(interrupt) = self.interrupted() {
            return Err(interrupt.into());
        }
        tokio::select! {
            biased;
            interrupt = self.done() => Err(interrupt.into()),
            result = future => result,
        }
    }
}
