//! Record Broker - pricing and submission workflow for used vinyl
//!
//! This crate computes buy offers and sell prices for vinyl releases from
//! cached marketplace statistics and drives seller submissions through
//! their negotiation lifecycle, from intake quote to inventory lot.

pub mod api;
pub mod audit;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod inventory;
pub mod market;
pub mod models;
pub mod notify;
pub mod policy;
pub mod storage;
pub mod submission;
pub mod tiers;

// Re-export commonly used items
pub use api::{DiscogsClient, EbayClient, EbayLiveFetcher};
pub use engine::{PriceCalculation, PricingEngine, ReleaseQuote};
pub use error::{BrokerError, Result};
pub use ingest::{sync_market_snapshots, IngestOptions, IngestStats};
pub use inventory::InventoryWriter;
pub use market::{LiveMarketData, MarketQuote, NoLiveData};
pub use models::{
    CalculationType, ItemStatus, MarketSource, MarketStatistic, MarketStats, PolicyScope,
    SellerResponse,
};
pub use notify::{CounterOfferNotice, CounterOfferNotifier, LogNotifier};
pub use storage::sqlite::SqliteStorage;
pub use storage::Storage;
pub use submission::{AcceptRequest, BulkOutcome, SubmissionWorkflow};
