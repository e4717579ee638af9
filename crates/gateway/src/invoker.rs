//! Bounded-time handler invocation.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use proto::{HandlerError, InvocationContext, ProxyResponse, WebsocketEvent};
use tracing::debug;

/// Time budget of a single handler invocation.
pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Future returned by a [`LambdaHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<ProxyResponse, HandlerError>> + Send>>;

/// Async callback receiving every lifecycle and message event.
///
/// Called concurrently from different connections.
pub type LambdaHandler =
    Arc<dyn Fn(InvocationContext, WebsocketEvent) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into a [`LambdaHandler`].
pub fn handler_fn<F, Fut>(f: F) -> LambdaHandler
where
    F: Fn(InvocationContext, WebsocketEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ProxyResponse, HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx, event| Box::pin(f(ctx, event)))
}

/// Calls the handler with a deadline and maps its outcome.
#[derive(Clone)]
pub struct HandlerInvoker {
    handler: LambdaHandler,
    timeout: Duration,
}

impl HandlerInvoker {
    pub fn new(handler: LambdaHandler) -> Self {
        Self {
            handler,
            timeout: HANDLER_TIMEOUT,
        }
    }

    /// Overrides the per-invocation time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invokes the handler for `event`.
    ///
    /// Errors, non-200 responses, deadline expiry and panics all come back
    /// as a [`HandlerError`]. The context is cancelled before returning.
    pub async fn invoke(&self, event: WebsocketEvent) -> Result<ProxyResponse, HandlerError> {
        let ctx = InvocationContext::new(self.timeout);
        let _cancel_on_return = ctx.token().clone().drop_guard();
        let deadline = ctx.deadline();

        debug!(
            connection_id = %event.connection_id(),
            event_type = %event.event_type(),
            "Invoking handler"
        );

        // Handlers may panic before returning their future, too.
        let build = std::panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(ctx, event)));
        let call = match build {
            Ok(call) => AssertUnwindSafe(call).catch_unwind(),
            Err(panic) => return Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        };
        let response = match tokio::time::timeout_at(deadline, call).await {
            Err(_) => return Err(HandlerError::Timeout(self.timeout)),
            Ok(Err(panic)) => return Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result?,
        };

        if !response.is_ok() {
            return Err(HandlerError::Status(response.status_code));
        }
        Ok(response)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
