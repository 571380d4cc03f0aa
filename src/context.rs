//! Per-request ambient context
//!
//! Carries the caller's credential through every await point of a request
//! without threading it through function signatures. Backed by a tokio task
//! local, so concurrently interleaved requests never observe each other's value.

use std::{fmt, future::Future, sync::Arc};

use tokio::task::JoinHandle;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

#[derive(Clone, PartialEq, Eq)]
pub struct RequestContext {
    external_api_key: Arc<str>,
}

impl RequestContext {
    pub fn new(external_api_key: impl Into<Arc<str>>) -> Self {
        Self {
            external_api_key: external_api_key.into(),
        }
    }

    pub fn external_api_key(&self) -> &str {
        &self.external_api_key
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("external_api_key", &"[REDACTED]")
            .finish()
    }
}

/// Runs `future` with `context` as the ambient request context.
pub async fn run<F>(context: RequestContext, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(context, future).await
}

/// The context of the request currently executing, if any.
pub fn current() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(RequestContext::clone).ok()
}

/// Spawns a task that inherits the current request context.
///
/// Plain `tokio::spawn` starts a fresh task with no task locals; use this for
/// work that belongs to the request that scheduled it.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(context) => tokio::spawn(REQUEST_CONTEXT.scope(context, future)),
        None => tokio::spawn(future),
    }
}
