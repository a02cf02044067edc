//! Discogs price suggestion client.
//!
//! Discogs suggests a sale price per condition grade for every release it
//! knows. The ingestion job reduces those suggestions to the low/median/
//! high statistics the pricing engine works with.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{BrokerError, Result};
use crate::models::MarketStats;

const DEFAULT_BASE_URL: &str = "https://api.discogs.com";
const USER_AGENT: &str = "record_broker/0.1";

#[derive(Debug, Deserialize)]
struct PriceSuggestion {
    value: f64,
}

pub struct DiscogsClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl DiscogsClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    /// Client against a different endpoint, used by tests.
    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        DiscogsClient {
            base_url: base_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Fetches price suggestions for a Discogs release id and reduces them
    /// to statistics. `Ok(None)` when Discogs has nothing for the release.
    pub async fn fetch_price_stats(&self, discogs_release_id: i64) -> Result<Option<MarketStats>> {
        let url = format!(
            "{}/marketplace/price_suggestions/{}",
            self.base_url, discogs_release_id
        );
        log::debug!("Fetching Discogs price suggestions for release {discogs_release_id}");

        let mut request = self.client.get(&url).header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Discogs token={token}"));
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Release not in the Discogs catalog or no suggestions yet
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BrokerError::HttpStatus(response.status()));
        }

        let suggestions: HashMap<String, PriceSuggestion> = response.json().await?;
        Ok(reduce_suggestions(&suggestions))
    }
}

fn reduce_suggestions(suggestions: &HashMap<String, PriceSuggestion>) -> Option<MarketStats> {
    let values: Vec<f64> = suggestions
        .values()
        .map(|suggestion| suggestion.value)
        .filter(|value| *value > 0.0)
        .collect();
    MarketStats::from_values(values)
}

#[cfg(test)]
#[path = "discogs_tests.rs"]
mod discogs_tests;
