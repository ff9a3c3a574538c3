//! Listing description writers.
//!
//! [`TemplateWriter`] builds text from the vehicle's attributes alone.
//! [`LlmWriter`] asks an Anthropic model through rig-core and is used when an
//! API key is configured.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::model::vehicle::Vehicle;

#[async_trait]
pub trait TextWriter: Send + Sync {
    async fn describe(&self, vehicle: &Vehicle) -> Result<String>;
}

/// Group thousands: 42000 -> "42,000".
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 { format!("-{out}") } else { out }
}

/// Deterministic description from vehicle attributes.
pub struct TemplateWriter;

impl TemplateWriter {
    pub fn render(vehicle: &Vehicle) -> String {
        let mut text = format!("Used {}", vehicle.title());
        if let Some(ref color) = vehicle.color {
            text.push_str(&format!(" in {color}"));
        }
        if let Some(miles) = vehicle.mileage {
            text.push_str(&format!(" with {} miles", thousands(miles.into())));
        }
        text.push('.');
        if let Some(cents) = vehicle.price {
            text.push_str(&format!(" Offered at ${}.", thousands(cents / 100)));
        }
        text.push_str(&format!(" VIN {}.", vehicle.vin));
        text
    }
}

#[async_trait]
impl TextWriter for TemplateWriter {
    async fn describe(&self, vehicle: &Vehicle) -> Result<String> {
        Ok(Self::render(vehicle))
    }
}

const PREAMBLE: &str = "You write short, factual used-car listing descriptions for a dealership website. \
Two to three sentences, no more than 60 words. Use only the facts given. No headings, no emoji.";

/// Anthropic-backed writer.
pub struct LlmWriter {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl LlmWriter {
    pub fn new(api_key: &SecretString, model: impl Into<String>) -> Result<Self> {
        let client = rig::providers::anthropic::Client::new(api_key.expose_secret())
            .map_err(|e| Error::Config(format!("failed to create Anthropic client: {e}")))?;
        Ok(Self {
            client,
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextWriter for LlmWriter {
    async fn describe(&self, vehicle: &Vehicle) -> Result<String> {
        let facts = serde_json::json!({
            "title": vehicle.title(),
            "color": vehicle.color,
            "mileage": vehicle.mileage,
            "price_usd": vehicle.price.map(|c| c / 100),
        });
        let agent = self
            .client
            .agent(self.model.as_str())
            .preamble(PREAMBLE)
            .max_tokens(300)
            .build();

        let span = tracing::info_span!(
            "gen_ai.chat",
            "gen_ai.operation.name" = "chat",
            "gen_ai.request.model" = %self.model,
            "gen_ai.provider.name" = "anthropic",
        );
        let text = agent
            .prompt(format!("Describe this vehicle: {facts}"))
            .into_future()
            .instrument(span)
            .await
            .map_err(|e| Error::Other(format!("description request failed: {e}")))?;

        let text = text.trim();
        if text.is_empty() {
            // Never store an empty description.
            return Ok(TemplateWriter::render(vehicle));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(42_000), "42,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn template_mentions_known_facts() {
        let v = Vehicle {
            vin: "1HGCV1F56KA000001".into(),
            year: Some(2019),
            make: "Honda".into(),
            model: "Accord".into(),
            trim: Some("EX-L".into()),
            mileage: Some(42_000),
            price: Some(1_899_900),
            color: Some("Black".into()),
            drive_folder_id: None,
            primary_image_url: None,
            seo_description: None,
        };
        assert_eq!(
            TemplateWriter::render(&v),
            "Used 2019 Honda Accord EX-L in Black with 42,000 miles. Offered at $18,999. VIN 1HGCV1F56KA000001."
        );
    }
}
