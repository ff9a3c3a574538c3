//! End-to-end tests for the built-in job handlers over the in-memory app.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use lotq::app::{App, Backends, InMemoryApp, Services};
use lotq::llm::TemplateWriter;
use lotq::model::job::{
    FOLDER_SYNC, FolderSyncPayload, InvitePayload, JobPayload, JobStatus, SEO_TEXT,
    SeoTextPayload,
};
use lotq::model::vehicle::Vehicle;
use lotq::queue::{Backoff, QueueConfig};
use lotq::services::{OutboxMailer, RemoteFile};
use lotq::store::{MediaStore, MemoryStore, VehicleStore};

const VIN: &str = "1HGCV1F56KA000001";

fn test_app() -> InMemoryApp {
    App::in_memory(QueueConfig {
        poll_interval: Duration::from_millis(20),
        max_retries: 2,
        backoff: Backoff::none(),
        kick_on_enqueue: false,
    })
}

fn accord() -> Vehicle {
    Vehicle {
        vin: VIN.into(),
        year: Some(2019),
        make: "Honda".into(),
        model: "Accord".into(),
        trim: Some("EX-L".into()),
        mileage: Some(42_000),
        price: Some(1_899_900),
        color: Some("Black".into()),
        drive_folder_id: Some("folder-1".into()),
        primary_image_url: None,
        seo_description: None,
    }
}

fn file(id: &str, mime: &str) -> RemoteFile {
    RemoteFile {
        id: id.into(),
        name: format!("{id}.bin"),
        mime_type: mime.into(),
    }
}

fn sync_job() -> JobPayload {
    JobPayload::FolderSync(FolderSyncPayload {
        vin: VIN.into(),
        folder_id: "folder-1".into(),
    })
}

// ---------------------------------------------------------------------------
// Folder sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn folder_sync_mirrors_media_and_backfills_primary() {
    let env = test_app();
    env.store.put_vehicle(accord()).unwrap();
    env.files
        .set_folder(
            "folder-1",
            vec![
                file("a", "image/jpeg"),
                file("notes", "application/pdf"),
                file("b", "video/mp4"),
            ],
        )
        .unwrap();

    let id = env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.drain().await.unwrap();
    assert_eq!(
        env.app.queue.get(id).await.unwrap().status,
        JobStatus::Completed
    );

    let media = env.store.list_media(VIN).await.unwrap();
    let ids: Vec<&str> = media.iter().map(|m| m.file_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(media[0].position, 0);
    assert_eq!(media[1].position, 1);

    let vehicle = env.store.get_vehicle(VIN).await.unwrap().unwrap();
    assert_eq!(vehicle.primary_image_url.as_deref(), Some("/files/a"));
}

#[tokio::test]
async fn folder_sync_is_idempotent_and_prunes_removed_files() {
    let env = test_app();
    env.store.put_vehicle(accord()).unwrap();
    env.files
        .set_folder("folder-1", vec![file("a", "image/jpeg"), file("b", "image/png")])
        .unwrap();

    env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.drain().await.unwrap();

    let media = env.store.list_media(VIN).await.unwrap();
    assert_eq!(media.len(), 2);

    env.files
        .set_folder("folder-1", vec![file("b", "image/png"), file("c", "image/png")])
        .unwrap();
    env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.drain().await.unwrap();

    let media = env.store.list_media(VIN).await.unwrap();
    let ids: Vec<&str> = media.iter().map(|m| m.file_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    // An existing primary image is never overwritten.
    let vehicle = env.store.get_vehicle(VIN).await.unwrap().unwrap();
    assert_eq!(vehicle.primary_image_url.as_deref(), Some("/files/a"));
}

#[tokio::test]
async fn folder_sync_for_unknown_vehicle_fails_without_retry() {
    let env = test_app();
    env.files.set_folder("folder-1", vec![]).unwrap();

    let id = env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.drain().await.unwrap();

    let job = env.app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
    assert!(job.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn folder_sync_retries_when_folder_listing_fails() {
    let env = test_app();
    env.store.put_vehicle(accord()).unwrap();

    let id = env.app.queue.enqueue_job(sync_job()).await.unwrap();
    env.app.queue.drain().await.unwrap();

    let job = env.app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 2);
}

#[tokio::test]
async fn folder_sync_without_file_storage_fails_without_retry() {
    let store = Arc::new(MemoryStore::new());
    store.put_vehicle(accord()).unwrap();
    let app = App::assemble(
        Backends::shared(Arc::clone(&store)),
        Services {
            files: None,
            mailer: Arc::new(OutboxMailer::new()),
            writer: Arc::new(TemplateWriter),
            mail_from: "no-reply@localhost".into(),
        },
        QueueConfig {
            max_retries: 2,
            backoff: Backoff::none(),
            kick_on_enqueue: false,
            ..QueueConfig::default()
        },
    );
    assert!(!app.queue.registered_types().contains(&FOLDER_SYNC.to_string()));

    let id = app.queue.enqueue_job(sync_job()).await.unwrap();
    app.queue.drain().await.unwrap();

    let job = app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
    assert!(job.error.unwrap().contains("no handler registered"));
}

#[tokio::test]
async fn folder_sync_with_bad_payload_is_malformed() {
    let env = test_app();
    let id = env
        .app
        .queue
        .enqueue(FOLDER_SYNC, json!({"vin": VIN}))
        .await
        .unwrap();
    env.app.queue.drain().await.unwrap();

    let job = env.app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
}

// ---------------------------------------------------------------------------
// Listing description
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seo_text_writes_description() {
    let env = test_app();
    env.store.put_vehicle(accord()).unwrap();

    let id = env
        .app
        .queue
        .enqueue_job(JobPayload::SeoText(SeoTextPayload { vin: VIN.into() }))
        .await
        .unwrap();
    env.app.queue.drain().await.unwrap();
    assert_eq!(
        env.app.queue.get(id).await.unwrap().status,
        JobStatus::Completed
    );

    let vehicle = env.store.get_vehicle(VIN).await.unwrap().unwrap();
    let text = vehicle.seo_description.unwrap();
    assert!(text.contains("2019 Honda Accord EX-L"), "got: {text}");
    assert!(text.contains("42,000 miles"), "got: {text}");
    assert!(text.contains(VIN), "got: {text}");
}

#[tokio::test]
async fn seo_text_for_unknown_vehicle_fails_without_retry() {
    let env = test_app();

    let id = env
        .app
        .queue
        .enqueue(SEO_TEXT, json!({"vin": "NOPE"}))
        .await
        .unwrap();
    env.app.queue.drain().await.unwrap();

    let job = env.app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invite_sends_one_email() {
    let env = test_app();

    let id = env
        .app
        .queue
        .enqueue_job(JobPayload::Invite(InvitePayload {
            email: "sam@example.com".into(),
            name: Some("Sam".into()),
            role: "SALES".into(),
            invited_by: "Pat".into(),
            accept_url: "https://dealer.test/invite/abc".into(),
        }))
        .await
        .unwrap();
    env.app.queue.drain().await.unwrap();
    assert_eq!(
        env.app.queue.get(id).await.unwrap().status,
        JobStatus::Completed
    );

    let sent = env.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "sam@example.com");
    assert_eq!(sent[0].from, "no-reply@localhost");
    assert!(sent[0].text.contains("https://dealer.test/invite/abc"));
}

#[tokio::test]
async fn invite_with_invalid_address_is_rejected() {
    let env = test_app();

    let id = env
        .app
        .queue
        .enqueue_job(JobPayload::Invite(InvitePayload {
            email: "not-an-address".into(),
            name: None,
            role: "SALES".into(),
            invited_by: "Pat".into(),
            accept_url: "https://dealer.test/invite/abc".into(),
        }))
        .await
        .unwrap();
    env.app.queue.drain().await.unwrap();

    let job = env.app.queue.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retries, 0);
    assert!(env.outbox.sent().is_empty());
}
