//! Application context.
//!
//! One [`JobQueue`] and one [`EventBus`] per process, built here at startup
//! and handed to callers explicitly.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::Config;
use crate::db::Db;
use crate::error::Result;
use crate::events::{EventBus, listeners};
use crate::llm::{LlmWriter, TemplateWriter, TextWriter};
use crate::queue::{JobQueue, QueueConfig};
use crate::services::{
    FileStorage, HttpFileStorage, HttpMailer, LogMailer, Mailer, OutboxMailer, StaticFileStorage,
};
use crate::store::{AuditSink, HistoryStore, JobStore, MediaStore, MemoryStore, VehicleStore};
use crate::workers::{self, Collaborators};

/// Persistence backends, usually all the same object.
pub struct Backends {
    pub jobs: Arc<dyn JobStore>,
    pub audit: Arc<dyn AuditSink>,
    pub history: Arc<dyn HistoryStore>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub media: Arc<dyn MediaStore>,
}

impl Backends {
    /// Every backend served by one store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: JobStore + AuditSink + HistoryStore + VehicleStore + MediaStore + 'static,
    {
        Self {
            jobs: store.clone(),
            audit: store.clone(),
            history: store.clone(),
            vehicles: store.clone(),
            media: store,
        }
    }
}

/// Outside systems the handlers call.
pub struct Services {
    pub files: Option<Arc<dyn FileStorage>>,
    pub mailer: Arc<dyn Mailer>,
    pub writer: Arc<dyn TextWriter>,
    pub mail_from: String,
}

pub struct App {
    pub queue: Arc<JobQueue>,
    pub bus: Arc<EventBus>,
    pub audit: Arc<dyn AuditSink>,
    pub history: Arc<dyn HistoryStore>,
}

/// An [`App`] over in-memory stores, with handles to its fakes.
pub struct InMemoryApp {
    pub app: App,
    pub store: Arc<MemoryStore>,
    pub files: Arc<StaticFileStorage>,
    pub outbox: Arc<OutboxMailer>,
}

impl App {
    /// Wire the queue, bus, handlers and listeners.
    pub fn assemble(backends: Backends, services: Services, queue_config: QueueConfig) -> Self {
        let queue = Arc::new(JobQueue::new(backends.jobs, queue_config));
        workers::register_all(
            &queue,
            Collaborators {
                files: services.files,
                mailer: services.mailer,
                writer: services.writer,
                vehicles: backends.vehicles,
                media: backends.media,
                mail_from: services.mail_from,
            },
        );

        let bus = Arc::new(EventBus::new(Arc::clone(&backends.audit)));
        listeners::register_all(&bus, Arc::clone(&backends.history));

        Self {
            queue,
            bus,
            audit: backends.audit,
            history: backends.history,
        }
    }

    /// Fully wired app with no external dependencies.
    pub fn in_memory(queue_config: QueueConfig) -> InMemoryApp {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(StaticFileStorage::new());
        let outbox = Arc::new(OutboxMailer::new());

        let app = Self::assemble(
            Backends::shared(Arc::clone(&store)),
            Services {
                files: Some(files.clone()),
                mailer: outbox.clone(),
                writer: Arc::new(TemplateWriter),
                mail_from: "no-reply@localhost".to_string(),
            },
            queue_config,
        );

        InMemoryApp {
            app,
            store,
            files,
            outbox,
        }
    }

    /// Connect to Postgres, migrate, and wire collaborators from `config`.
    pub async fn connect(config: &Config) -> Result<(Self, Db)> {
        let db = Db::connect(config.database_url.expose_secret()).await?;
        db.migrate().await?;
        let db_handle = Arc::new(db.clone());

        let files: Option<Arc<dyn FileStorage>> = match config.file_proxy_url {
            Some(ref url) => Some(Arc::new(HttpFileStorage::new(url.clone())?)),
            None => None,
        };
        let mailer: Arc<dyn Mailer> = match config.mail_api_url {
            Some(ref url) => {
                let key = config
                    .mail_api_key
                    .as_ref()
                    .map(|k| SecretString::from(k.expose_secret().to_string()));
                Arc::new(HttpMailer::new(url.clone(), key)?)
            }
            None => Arc::new(LogMailer),
        };
        let writer: Arc<dyn TextWriter> = match config.anthropic_api_key {
            Some(ref key) => Arc::new(LlmWriter::new(key, config.llm_model.clone())?),
            None => Arc::new(TemplateWriter),
        };

        info!(
            file_proxy = config.file_proxy_url.is_some(),
            mail_api = config.mail_api_url.is_some(),
            llm = config.anthropic_api_key.is_some(),
            "collaborators configured"
        );

        let app = Self::assemble(
            Backends::shared(db_handle),
            Services {
                files,
                mailer,
                writer,
                mail_from: config.mail_from.clone(),
            },
            config.queue.clone(),
        );
        Ok((app, db))
    }
}
