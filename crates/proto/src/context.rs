//! Deadline-bounded, cancellable context handed to every handler call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Context for one handler invocation.
///
/// The invoker cancels the token as soon as the invocation returns, so any
/// work the handler spawned and tied to it can stop.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    deadline: Instant,
    token: CancellationToken,
}

impl InvocationContext {
    /// Creates a context whose deadline is `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout, CancellationToken::new())
    }

    /// Creates a context from an explicit deadline and token.
    pub fn with_deadline(deadline: Instant, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    /// Point in time after which the invocation is abandoned.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline, zero once it passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Token cancelled when the invocation returns.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the invocation already returned.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}
