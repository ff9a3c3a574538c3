//! Regenerate a vehicle's listing description. Each run overwrites the field.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::llm::TextWriter;
use crate::model::job::SeoTextPayload;
use crate::queue::{HandlerError, JobHandler};
use crate::store::VehicleStore;

pub struct SeoTextHandler {
    vehicles: Arc<dyn VehicleStore>,
    writer: Arc<dyn TextWriter>,
}

impl SeoTextHandler {
    pub fn new(vehicles: Arc<dyn VehicleStore>, writer: Arc<dyn TextWriter>) -> Self {
        Self { vehicles, writer }
    }
}

#[async_trait]
impl JobHandler for SeoTextHandler {
    type Payload = SeoTextPayload;

    async fn handle(&self, payload: SeoTextPayload) -> Result<(), HandlerError> {
        let Some(vehicle) = self.vehicles.get_vehicle(&payload.vin).await? else {
            return Err(HandlerError::Permanent(format!(
                "vehicle {} not found",
                payload.vin
            )));
        };

        let text = self.writer.describe(&vehicle).await?;
        self.vehicles
            .set_seo_description(&vehicle.vin, &text)
            .await?;

        info!(vin = %vehicle.vin, chars = text.len(), "listing description updated");
        Ok(())
    }
}
