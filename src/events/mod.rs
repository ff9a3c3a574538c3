//! In-process domain event bus.
//!
//! `emit` runs every listener subscribed to the event's name, in
//! registration order, before returning. Each listener is isolated: a
//! failure is recorded and the remaining listeners still run. Separately, a
//! detached task writes the raw event to the audit sink; that write never
//! affects the emitter.

pub mod listeners;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::error::Error;
use crate::model::event::{DomainEvent, Emitted, EventName};
use crate::store::AuditSink;
use crate::telemetry::metrics;

/// A subscriber to one or more event names.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &str;

    async fn on_event(&self, emitted: &Emitted) -> crate::error::Result<()>;
}

/// One listener's failure during an emit.
#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: String,
    pub error: Error,
}

/// Returned by [`EventBus::emit`] when at least one listener failed. Every
/// listener has still been invoked.
#[derive(Debug, thiserror::Error)]
#[error("{n} listener(s) failed for {event}", n = .failures.len())]
pub struct EmitError {
    pub event: EventName,
    pub failures: Vec<ListenerFailure>,
}

pub struct EventBus {
    listeners: RwLock<HashMap<EventName, Vec<Arc<dyn Listener>>>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl EventBus {
    /// A bus that also mirrors every event to `audit`.
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            audit: Some(audit),
        }
    }

    /// A bus with listeners only.
    pub fn without_audit() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    /// Subscribe `listener` to `name`. Listeners accumulate; none replaces
    /// another.
    pub fn on(&self, name: EventName, listener: Arc<dyn Listener>) {
        debug!(event = %name, listener = listener.name(), "listener subscribed");
        match self.listeners.write() {
            Ok(mut map) => map.entry(name).or_default().push(listener),
            Err(poisoned) => poisoned.into_inner().entry(name).or_default().push(listener),
        }
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners_for(name).len()
    }

    fn listeners_for(&self, name: EventName) -> Vec<Arc<dyn Listener>> {
        let snapshot = match self.listeners.read() {
            Ok(map) => map.get(&name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&name).cloned(),
        };
        snapshot.unwrap_or_default()
    }

    /// Publish `event` to its listeners and, detached, to the audit sink.
    pub async fn emit(&self, event: DomainEvent) -> Result<(), EmitError> {
        let emitted = Emitted {
            at: Utc::now(),
            event,
        };
        let name = emitted.event.name();
        metrics::events_emitted().add(1, &[KeyValue::new("event", name.as_str())]);

        self.spawn_audit_write(&emitted);

        let mut failures = Vec::new();
        for listener in self.listeners_for(name) {
            if let Err(error) = listener.on_event(&emitted).await {
                warn!(event = %name, listener = listener.name(), %error, "listener failed");
                metrics::listener_failures().add(
                    1,
                    &[
                        KeyValue::new("event", name.as_str()),
                        KeyValue::new("listener", listener.name().to_string()),
                    ],
                );
                failures.push(ListenerFailure {
                    listener: listener.name().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EmitError {
                event: name,
                failures,
            })
        }
    }

    fn spawn_audit_write(&self, emitted: &Emitted) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let name = emitted.event.name();
        let details = match serde_json::to_value(&emitted.event) {
            Ok(v) => v,
            Err(error) => {
                warn!(event = %name, %error, "could not serialize event for audit");
                return;
            }
        };
        let user = emitted.event.user().to_string();

        tokio::spawn(async move {
            if let Err(error) = audit.log(name.as_str(), details, Some(&user)).await {
                warn!(event = %name, %error, "audit write failed");
                metrics::audit_write_failures().add(1, &[KeyValue::new("event", name.as_str())]);
            }
        });
    }
}

/// A listener built from a name and an async closure.
pub struct FnListener<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as a [`Listener`]. The closure receives its own
/// copy of the emitted event.
pub fn listener_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Listener>
where
    F: Fn(Emitted) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
{
    Arc::new(FnListener {
        name: name.into(),
        f,
    })
}

#[async_trait]
impl<F, Fut> Listener for FnListener<F>
where
    F: Fn(Emitted) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, emitted: &Emitted) -> crate::error::Result<()> {
        (self.f)(emitted.clone()).await
    }
}
