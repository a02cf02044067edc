//! Periodic refresh of cached market snapshots.
//!
//! Walks the release catalog and refreshes the Discogs and eBay snapshot
//! rows for every release whose cached data is older than the configured
//! age. A release with no completed sales still gets a snapshot row with
//! empty statistics so the price resolver can tell "checked, nothing
//! there" apart from "never checked".

use std::future::Future;
use std::time::Duration;

use crate::api::{DiscogsClient, EbayClient};
use crate::error::{BrokerError, Result};
use crate::models::{MarketSource, MarketStats, Release};
use crate::storage::{NewMarketSnapshot, Storage};

/// Tuning knobs for a snapshot refresh batch.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Snapshots younger than this are not re-fetched.
    pub snapshot_max_age_hours: i64,
    /// How often to attempt each provider fetch before giving up.
    pub fetch_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            snapshot_max_age_hours: 24,
            fetch_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome counts for one refresh batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Releases visited.
    pub releases: usize,
    /// Snapshot rows written (one per release and source).
    pub refreshed: usize,
    /// Source lookups skipped because the cached row was fresh enough.
    pub skipped_fresh: usize,
    /// Releases abandoned after all fetch attempts failed.
    pub failed: usize,
}

#[derive(Default)]
struct RefreshOutcome {
    refreshed: usize,
    skipped: usize,
}

/// Refreshes stale market snapshots for every known release.
///
/// A release whose fetches keep failing is logged and counted, then the
/// batch moves on; one broken release never stops the rest.
pub async fn sync_market_snapshots(
    storage: &dyn Storage,
    discogs: &DiscogsClient,
    ebay: &EbayClient,
    options: &IngestOptions,
) -> Result<IngestStats> {
    let releases = storage.list_releases()?;
    let mut stats = IngestStats {
        releases: releases.len(),
        ..IngestStats::default()
    };

    for release in &releases {
        match refresh_release(storage, discogs, ebay, release, options).await {
            Ok(outcome) => {
                stats.refreshed += outcome.refreshed;
                stats.skipped_fresh += outcome.skipped;
            }
            Err(error) => {
                log::error!(
                    "Snapshot refresh failed for release {} ('{}'): {}",
                    release.id,
                    release.title,
                    error
                );
                stats.failed += 1;
            }
        }
    }

    log::info!(
        "Snapshot batch done: {} releases, {} refreshed, {} fresh, {} failed",
        stats.releases,
        stats.refreshed,
        stats.skipped_fresh,
        stats.failed
    );
    Ok(stats)
}

async fn refresh_release(
    storage: &dyn Storage,
    discogs: &DiscogsClient,
    ebay: &EbayClient,
    release: &Release,
    options: &IngestOptions,
) -> Result<RefreshOutcome> {
    let mut outcome = RefreshOutcome::default();

    match release.discogs_release_id {
        Some(discogs_id) if needs_refresh(storage, release, MarketSource::Discogs, options)? => {
            let stats = fetch_with_retry(
                || discogs.fetch_price_stats(discogs_id),
                options,
                "Discogs",
            )
            .await?;
            store_snapshot(storage, release, MarketSource::Discogs, stats)?;
            outcome.refreshed += 1;
        }
        Some(_) => outcome.skipped += 1,
        None => {
            log::debug!(
                "Release {} ('{}') has no Discogs id, skipping Discogs lookup",
                release.id,
                release.title
            );
        }
    }

    if needs_refresh(storage, release, MarketSource::Ebay, options)? {
        let stats = fetch_with_retry(
            || ebay.fetch_sold_stats(&release.title, &release.artist),
            options,
            "eBay",
        )
        .await?;
        store_snapshot(storage, release, MarketSource::Ebay, stats)?;
        outcome.refreshed += 1;
    } else {
        outcome.skipped += 1;
    }

    Ok(outcome)
}

fn needs_refresh(
    storage: &dyn Storage,
    release: &Release,
    source: MarketSource,
    options: &IngestOptions,
) -> Result<bool> {
    match storage.get_snapshot(release.id, source)? {
        Some(snapshot) => Ok(snapshot.is_stale(options.snapshot_max_age_hours)),
        None => Ok(true),
    }
}

fn store_snapshot(
    storage: &dyn Storage,
    release: &Release,
    source: MarketSource,
    stats: Option<MarketStats>,
) -> Result<()> {
    // An empty stats row still marks the source as checked.
    let (stat_low, stat_median, stat_high) = match stats {
        Some(stats) => (stats.stat_low, stats.stat_median, stats.stat_high),
        None => {
            log::debug!(
                "No {} market data for release {} ('{}')",
                source.as_str(),
                release.id,
                release.title
            );
            (None, None, None)
        }
    };
    storage.upsert_snapshot(&NewMarketSnapshot {
        release_id: release.id,
        source,
        stat_low,
        stat_median,
        stat_high,
    })?;
    Ok(())
}

async fn fetch_with_retry<F, Fut>(
    mut fetch: F,
    options: &IngestOptions,
    label: &str,
) -> Result<Option<MarketStats>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<MarketStats>>>,
{
    let attempts = options.fetch_attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match fetch().await {
            Ok(stats) => return Ok(stats),
            Err(error) => {
                log::warn!("{label} fetch attempt {attempt}/{attempts} failed: {error}");
                last_error = Some(error);
                if attempt < attempts {
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| BrokerError::Internal(format!("{label} fetch failed without error"))))
}
