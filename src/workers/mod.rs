//! Job handlers and their startup registration.

pub mod folder_sync;
pub mod invite;
pub mod seo_text;

pub use folder_sync::FolderSyncHandler;
pub use invite::InviteHandler;
pub use seo_text::SeoTextHandler;

use std::sync::Arc;

use tracing::warn;

use crate::llm::TextWriter;
use crate::model::job::{FOLDER_SYNC, INVITE, SEO_TEXT};
use crate::queue::JobQueue;
use crate::services::{FileStorage, Mailer};
use crate::store::{MediaStore, VehicleStore};

/// Everything the built-in handlers depend on.
pub struct Collaborators {
    /// Without file storage, folder sync jobs are left unroutable.
    pub files: Option<Arc<dyn FileStorage>>,
    pub mailer: Arc<dyn Mailer>,
    pub writer: Arc<dyn TextWriter>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub media: Arc<dyn MediaStore>,
    pub mail_from: String,
}

/// Register every built-in handler. Call before any job can be processed.
pub fn register_all(queue: &JobQueue, c: Collaborators) {
    match c.files {
        Some(files) => queue.register(
            FOLDER_SYNC,
            FolderSyncHandler::new(files, c.media, Arc::clone(&c.vehicles)),
        ),
        None => warn!(
            job_type = FOLDER_SYNC,
            "no file storage configured, handler not registered"
        ),
    }
    queue.register(SEO_TEXT, SeoTextHandler::new(c.vehicles, c.writer));
    queue.register(INVITE, InviteHandler::new(c.mailer, c.mail_from));
}
