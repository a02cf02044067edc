//! Marketplace API clients used by snapshot ingestion and live lookups.

pub mod discogs;
pub mod ebay;

pub use discogs::DiscogsClient;
pub use ebay::{EbayClient, EbayLiveFetcher};
