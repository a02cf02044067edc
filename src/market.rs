//! Market price resolution.
//!
//! Walks the policy's source probe order over cached snapshots, taking the
//! first positive value of the configured statistic. Zero and negative
//! values count as missing, marketplaces report zeros for releases with no
//! sales. When the probe order includes eBay and no snapshot helped, a
//! live eBay lookup is the last resort; its result is used for this one
//! calculation and never written back as a snapshot.

use crate::error::Result;
use crate::models::{
    CalculationType, MarketSource, MarketStatistic, MarketStats, PricingPolicy, Release,
};
use crate::storage::Storage;

/// Live marketplace lookup used when every cached snapshot comes up empty.
pub trait LiveMarketData {
    fn fetch_live(&self, title: &str, artist: &str) -> Result<Option<MarketStats>>;
}

/// Live fetcher that never finds anything. Useful where live escalation
/// is not wanted, pricing then falls back to the policy floor.
pub struct NoLiveData;

impl LiveMarketData for NoLiveData {
    fn fetch_live(&self, _title: &str, _artist: &str) -> Result<Option<MarketStats>> {
        Ok(None)
    }
}

/// Outcome of a market price resolution.
#[derive(Debug, Clone)]
pub struct MarketQuote {
    /// Resolved market price, `None` when no usable data exists anywhere
    pub price: Option<f64>,
    /// Source that supplied the price, or the configured source when none did
    pub source: MarketSource,
    pub statistic: MarketStatistic,
    /// Snapshot the price came from, `None` for live fetches and misses
    pub snapshot_id: Option<i64>,
    pub live_fetched: bool,
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|price| *price > 0.0)
}

/// Resolves the market price for one calculation.
///
/// Live fetch failures are logged and treated as "no data" so that a
/// flaky marketplace cannot take quoting down with it.
pub fn resolve_market_price(
    storage: &dyn Storage,
    live: &dyn LiveMarketData,
    release: &Release,
    policy: &PricingPolicy,
    calculation_type: CalculationType,
) -> Result<MarketQuote> {
    let configured = policy.source_for(calculation_type);
    let statistic = policy.statistic_for(calculation_type);

    for source in configured.probe_order() {
        if let Some(snapshot) = storage.get_snapshot(release.id, *source)? {
            if let Some(price) = usable(snapshot.stat(statistic)) {
                return Ok(MarketQuote {
                    price: Some(price),
                    source: *source,
                    statistic,
                    snapshot_id: Some(snapshot.id),
                    live_fetched: false,
                });
            }
            log::debug!(
                "Snapshot {} for release {} has no usable {} value",
                snapshot.id,
                release.id,
                statistic.as_str()
            );
        }
    }

    if configured.probe_order().contains(&MarketSource::Ebay) {
        log::debug!(
            "No cached {} price for release {}, trying live eBay lookup",
            statistic.as_str(),
            release.id
        );
        match live.fetch_live(&release.title, &release.artist) {
            Ok(Some(stats)) => {
                if let Some(price) = usable(stats.stat(statistic)) {
                    return Ok(MarketQuote {
                        price: Some(price),
                        source: MarketSource::Ebay,
                        statistic,
                        snapshot_id: None,
                        live_fetched: true,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Live eBay lookup failed for release {}: {}", release.id, e);
            }
        }
    }

    Ok(MarketQuote {
        price: None,
        source: configured,
        statistic,
        snapshot_id: None,
        live_fetched: false,
    })
}
