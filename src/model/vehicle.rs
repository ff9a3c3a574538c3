//! Vehicle and media records touched by the job handlers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: String,
    pub year: Option<i32>,
    pub make: String,
    pub model: String,
    pub trim: Option<String>,
    pub mileage: Option<i32>,
    /// Asking price in cents.
    pub price: Option<i64>,
    pub color: Option<String>,
    pub drive_folder_id: Option<String>,
    pub primary_image_url: Option<String>,
    pub seo_description: Option<String>,
}

impl Vehicle {
    /// "2019 Honda Accord EX-L", skipping missing parts.
    pub fn title(&self) -> String {
        let mut parts = Vec::new();
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        parts.push(self.make.clone());
        parts.push(self.model.clone());
        if let Some(ref trim) = self.trim {
            parts.push(trim.clone());
        }
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A vehicle's locally recorded reference to a remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: i64,
    pub vin: String,
    /// Remote file identifier; the sync key.
    pub file_id: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub position: i32,
}

/// A media reference to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMediaRef {
    pub vin: String,
    pub file_id: String,
    pub url: String,
    pub mime_type: Option<String>,
    pub position: i32,
}
