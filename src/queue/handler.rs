//! Handler trait and the type-erased form the registry stores.
//!
//! A handler declares the payload type it expects. The registry decodes the
//! stored JSON into that type before calling it, so a payload that does not
//! decode is rejected as [`HandlerError::Malformed`] and never retried.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Error returned by a job handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Payload did not decode into the handler's type. Not retried.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The job can never succeed (e.g. its subject was deleted). Not retried.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Anything else. Retried while the job has retries left.
    #[error("{0}")]
    Transient(String),
}

impl HandlerError {
    pub fn transient(msg: impl std::fmt::Display) -> Self {
        HandlerError::Transient(msg.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

impl From<crate::error::Error> for HandlerError {
    fn from(e: crate::error::Error) -> Self {
        HandlerError::Transient(e.to_string())
    }
}

/// Executes every job of one type.
///
/// Handlers may be invoked more than once for the same payload (a failure
/// after partial work is retried), so they must tolerate re-runs.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    async fn handle(&self, payload: Self::Payload) -> Result<(), HandlerError>;
}

/// Object-safe handler over raw JSON.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn call(&self, payload: serde_json::Value) -> Result<(), HandlerError>;
}

pub(crate) struct Typed<H>(pub H);

#[async_trait]
impl<H: JobHandler> ErasedHandler for Typed<H> {
    async fn call(&self, payload: serde_json::Value) -> Result<(), HandlerError> {
        let decoded: H::Payload = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;
        self.0.handle(decoded).await
    }
}

/// A handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<P, F> {
    f: F,
    _payload: PhantomData<fn(P)>,
}

/// Wrap an async closure as a [`JobHandler`].
///
/// ```ignore
/// queue.register("ping", handler_fn(|p: serde_json::Value| async move {
///     tracing::info!(?p, "pong");
///     Ok(())
/// }));
/// ```
pub fn handler_fn<P, F, Fut>(f: F) -> FnHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler {
        f,
        _payload: PhantomData,
    }
}

#[async_trait]
impl<P, F, Fut> JobHandler for FnHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    type Payload = P;

    async fn handle(&self, payload: P) -> Result<(), HandlerError> {
        (self.f)(payload).await
    }
}
