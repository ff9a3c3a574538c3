//! Mirror a remote folder into a vehicle's media references.
//!
//! Keyed by remote file id, so re-running over an unchanged folder writes
//! nothing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::model::job::FolderSyncPayload;
use crate::model::vehicle::{MediaRef, NewMediaRef};
use crate::queue::{HandlerError, JobHandler};
use crate::services::{FileStorage, RemoteFile};
use crate::store::{MediaStore, VehicleStore};

pub struct FolderSyncHandler {
    files: Arc<dyn FileStorage>,
    media: Arc<dyn MediaStore>,
    vehicles: Arc<dyn VehicleStore>,
}

/// What a sync pass will change.
#[derive(Debug, Default, PartialEq)]
pub struct SyncPlan {
    pub delete: Vec<i64>,
    pub insert: Vec<NewMediaRef>,
}

impl FolderSyncHandler {
    pub fn new(
        files: Arc<dyn FileStorage>,
        media: Arc<dyn MediaStore>,
        vehicles: Arc<dyn VehicleStore>,
    ) -> Self {
        Self {
            files,
            media,
            vehicles,
        }
    }

    /// Reconcile `local` against `remote`.
    ///
    /// Local refs missing remotely are deleted. Remote media files not yet
    /// recorded are appended after the highest surviving position.
    pub fn plan(
        vin: &str,
        local: &[MediaRef],
        remote: &[RemoteFile],
        url_for: impl Fn(&str) -> String,
    ) -> SyncPlan {
        let remote: Vec<&RemoteFile> = remote.iter().filter(|f| f.is_media()).collect();
        let remote_ids: HashSet<&str> = remote.iter().map(|f| f.id.as_str()).collect();

        let (kept, gone): (Vec<&MediaRef>, Vec<&MediaRef>) = local
            .iter()
            .partition(|m| remote_ids.contains(m.file_id.as_str()));
        let known: HashSet<&str> = kept.iter().map(|m| m.file_id.as_str()).collect();

        let mut next = kept.iter().map(|m| m.position).max().map_or(0, |p| p + 1);
        let mut seen = HashSet::new();
        let mut insert = Vec::new();
        for file in remote {
            if known.contains(file.id.as_str()) || !seen.insert(file.id.as_str()) {
                continue;
            }
            insert.push(NewMediaRef {
                vin: vin.to_string(),
                file_id: file.id.clone(),
                url: url_for(&file.id),
                mime_type: Some(file.mime_type.clone()),
                position: next,
            });
            next += 1;
        }

        SyncPlan {
            delete: gone.iter().map(|m| m.id).collect(),
            insert,
        }
    }
}

#[async_trait]
impl JobHandler for FolderSyncHandler {
    type Payload = FolderSyncPayload;

    async fn handle(&self, payload: FolderSyncPayload) -> Result<(), HandlerError> {
        let FolderSyncPayload { vin, folder_id } = payload;

        if self.vehicles.get_vehicle(&vin).await?.is_none() {
            return Err(HandlerError::Permanent(format!("vehicle {vin} not found")));
        }

        let remote = self.files.list_folder(&folder_id).await?;
        let local = self.media.list_media(&vin).await?;
        let plan = Self::plan(&vin, &local, &remote, |id| self.files.file_url(id));

        self.media.delete_media(&plan.delete).await?;
        self.media.insert_media(&plan.insert).await?;

        let primary = self
            .media
            .list_media(&vin)
            .await?
            .into_iter()
            .find(|m| m.mime_type.as_deref().is_none_or(|t| t.starts_with("image/")));
        let backfilled = match primary {
            Some(first) => self.vehicles.backfill_primary_image(&vin, &first.url).await?,
            None => false,
        };

        info!(
            %vin,
            %folder_id,
            remote = remote.len(),
            deleted = plan.delete.len(),
            inserted = plan.insert.len(),
            backfilled,
            "folder synced"
        );
        Ok(())
    }
}
