//! External collaborators the job handlers talk to.

pub mod files;
pub mod mail;

pub use files::{FileStorage, HttpFileStorage, RemoteFile, StaticFileStorage};
pub use mail::{Email, HttpMailer, LogMailer, Mailer, OutboxMailer};
