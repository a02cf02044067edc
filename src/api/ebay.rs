//! eBay sold-listings lookup.
//!
//! Queries the Finding API for completed sales of a release. The response
//! format nests every field inside single-element arrays and carries
//! prices as strings; the parser flattens all of that into a plain price
//! list before reducing it to statistics.
//!
//! Two variants exist over the same endpoint: the async [`EbayClient`]
//! for the ingestion job and the blocking [`EbayLiveFetcher`] the pricing
//! path escalates to when no cached snapshot has data.

use serde::Deserialize;

use crate::error::{BrokerError, Result};
use crate::market::LiveMarketData;
use crate::models::MarketStats;

const DEFAULT_BASE_URL: &str = "https://svcs.ebay.com";
const SEARCH_PATH: &str = "/services/search/FindingService/v1";

#[derive(Debug, Deserialize)]
struct FindingResponse {
    #[serde(rename = "findCompletedItemsResponse", default)]
    responses: Vec<CompletedItems>,
}

#[derive(Debug, Deserialize)]
struct CompletedItems {
    #[serde(rename = "searchResult", default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "item", default)]
    items: Vec<SoldItem>,
}

#[derive(Debug, Deserialize)]
struct SoldItem {
    #[serde(rename = "sellingStatus", default)]
    selling_status: Vec<SellingStatus>,
}

#[derive(Debug, Deserialize)]
struct SellingStatus {
    #[serde(rename = "currentPrice", default)]
    current_price: Vec<PriceValue>,
}

#[derive(Debug, Deserialize)]
struct PriceValue {
    #[serde(rename = "__value__")]
    value: String,
}

fn sold_prices(response: &FindingResponse) -> Vec<f64> {
    response
        .responses
        .iter()
        .flat_map(|response| &response.search_results)
        .flat_map(|result| &result.items)
        .flat_map(|item| &item.selling_status)
        .flat_map(|status| &status.current_price)
        .filter_map(|price| price.value.parse::<f64>().ok())
        .filter(|value| *value > 0.0)
        .collect()
}

fn search_url(base_url: &str, app_id: Option<&str>, title: &str, artist: &str) -> String {
    let keywords = format!("{title} {artist}");
    let mut url = format!(
        "{}{}?OPERATION-NAME=findCompletedItems&SERVICE-VERSION=1.13.0\
         &RESPONSE-DATA-FORMAT=JSON&keywords={}\
         &itemFilter(0).name=SoldItemsOnly&itemFilter(0).value=true\
         &paginationInput.entriesPerPage=25",
        base_url,
        SEARCH_PATH,
        urlencoding::encode(&keywords)
    );
    if let Some(app_id) = app_id {
        url.push_str("&SECURITY-APPNAME=");
        url.push_str(&urlencoding::encode(app_id));
    }
    url
}

/// Async client used by the snapshot ingestion job.
pub struct EbayClient {
    base_url: String,
    app_id: Option<String>,
    client: reqwest::Client,
}

impl EbayClient {
    pub fn new(app_id: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, app_id)
    }

    pub fn with_base_url(base_url: impl Into<String>, app_id: Option<String>) -> Self {
        EbayClient {
            base_url: base_url.into(),
            app_id,
            client: reqwest::Client::new(),
        }
    }

    /// Searches completed sales for the release and reduces the observed
    /// prices. `Ok(None)` when nothing sold recently.
    pub async fn fetch_sold_stats(&self, title: &str, artist: &str) -> Result<Option<MarketStats>> {
        let url = search_url(&self.base_url, self.app_id.as_deref(), title, artist);
        log::debug!("Fetching eBay sold listings for '{title}' by '{artist}'");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BrokerError::HttpStatus(response.status()));
        }
        let parsed: FindingResponse = response.json().await?;
        Ok(MarketStats::from_values(sold_prices(&parsed)))
    }
}

/// Blocking variant for the synchronous pricing path. One throwaway
/// request per call, the escalation fires rarely.
pub struct EbayLiveFetcher {
    base_url: String,
    app_id: Option<String>,
}

impl EbayLiveFetcher {
    pub fn new(app_id: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, app_id)
    }

    pub fn with_base_url(base_url: impl Into<String>, app_id: Option<String>) -> Self {
        EbayLiveFetcher {
            base_url: base_url.into(),
            app_id,
        }
    }
}

impl LiveMarketData for EbayLiveFetcher {
    fn fetch_live(&self, title: &str, artist: &str) -> Result<Option<MarketStats>> {
        let url = search_url(&self.base_url, self.app_id.as_deref(), title, artist);
        log::debug!("Live eBay lookup for '{title}' by '{artist}'");
        let response = reqwest::blocking::get(&url)?;
        if !response.status().is_success() {
            return Err(BrokerError::HttpStatus(response.status()));
        }
        let parsed: FindingResponse = response.json()?;
        Ok(MarketStats::from_values(sold_prices(&parsed)))
    }
}

#[cfg(test)]
#[path = "ebay_tests.rs"]
mod ebay_tests;
