//! Vehicle and media rows used by the sync and SEO handlers.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::vehicle::{MediaRef, NewMediaRef, Vehicle};
use crate::store::{MediaStore, VehicleStore};

#[async_trait]
impl VehicleStore for super::Db {
    async fn get_vehicle(&self, vin: &str) -> Result<Option<Vehicle>> {
        let row: Option<VehicleRow> = sqlx::query_as(
            "SELECT vin, year, make, model, trim, mileage, price, color, drive_folder_id, primary_image_url, seo_description
             FROM vehicles WHERE vin = $1",
        )
        .bind(vin)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Vehicle::from))
    }

    async fn set_seo_description(&self, vin: &str, text: &str) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE vehicles SET seo_description = $1, updated_at = now() WHERE vin = $2",
        )
        .bind(text)
        .bind(vin)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("vehicle {vin}")));
        }
        Ok(())
    }

    async fn backfill_primary_image(&self, vin: &str, url: &str) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE vehicles SET primary_image_url = $1, updated_at = now()
             WHERE vin = $2 AND (primary_image_url IS NULL OR primary_image_url = '')",
        )
        .bind(url)
        .bind(vin)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl MediaStore for super::Db {
    async fn list_media(&self, vin: &str) -> Result<Vec<MediaRef>> {
        let rows: Vec<(i64, String, String, String, Option<String>, i32)> = sqlx::query_as(
            "SELECT id, vin, file_id, url, mime_type, position
             FROM vehicle_media WHERE vin = $1 ORDER BY position, id",
        )
        .bind(vin)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, vin, file_id, url, mime_type, position)| MediaRef {
                id,
                vin,
                file_id,
                url,
                mime_type,
                position,
            })
            .collect())
    }

    async fn delete_media(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM vehicle_media WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn insert_media(&self, refs: &[NewMediaRef]) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for new in refs {
            // The (vin, file_id) key makes a concurrent re-sync a no-op.
            sqlx::query(
                "INSERT INTO vehicle_media (vin, file_id, url, mime_type, position)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (vin, file_id) DO NOTHING",
            )
            .bind(&new.vin)
            .bind(&new.file_id)
            .bind(&new.url)
            .bind(&new.mime_type)
            .bind(new.position)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    vin: String,
    year: Option<i32>,
    make: String,
    model: String,
    trim: Option<String>,
    mileage: Option<i32>,
    price: Option<i64>,
    color: Option<String>,
    drive_folder_id: Option<String>,
    primary_image_url: Option<String>,
    seo_description: Option<String>,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Self {
            vin: row.vin,
            year: row.year,
            make: row.make,
            model: row.model,
            trim: row.trim,
            mileage: row.mileage,
            price: row.price,
            color: row.color,
            drive_folder_id: row.drive_folder_id,
            primary_image_url: row.primary_image_url,
            seo_description: row.seo_description,
        }
    }
}
