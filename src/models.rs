//! Domain model shared by the pricing engine and the submission workflow.
//!
//! Monetary values are plain `f64` in shop currency. Timestamps are UTC
//! strings in SQLite `datetime('now')` format (`YYYY-MM-DD HH:MM:SS`).

use chrono::{Duration, NaiveDateTime, Utc};

const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Enumerations ──

/// Precedence scope of a pricing policy. Release beats genre beats global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyScope {
    Global,
    Genre,
    Release,
}

impl PolicyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyScope::Global => "global",
            PolicyScope::Genre => "genre",
            PolicyScope::Release => "release",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "global" => Some(PolicyScope::Global),
            "genre" => Some(PolicyScope::Genre),
            "release" => Some(PolicyScope::Release),
            _ => None,
        }
    }
}

/// Marketplace a policy draws statistics from. `Hybrid` is a probe order,
/// not a stored source: snapshots only ever carry `Discogs` or `Ebay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSource {
    Discogs,
    Ebay,
    Hybrid,
}

impl MarketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSource::Discogs => "discogs",
            MarketSource::Ebay => "ebay",
            MarketSource::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discogs" => Some(MarketSource::Discogs),
            "ebay" => Some(MarketSource::Ebay),
            "hybrid" => Some(MarketSource::Hybrid),
            _ => None,
        }
    }

    /// Concrete sources to try, in order, when resolving a market price.
    pub fn probe_order(&self) -> &'static [MarketSource] {
        match self {
            MarketSource::Discogs => &[MarketSource::Discogs],
            MarketSource::Ebay => &[MarketSource::Ebay],
            MarketSource::Hybrid => &[MarketSource::Discogs, MarketSource::Ebay],
        }
    }
}

/// Which statistic of a snapshot a policy reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatistic {
    Low,
    Median,
    High,
}

impl MarketStatistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatistic::Low => "low",
            MarketStatistic::Median => "median",
            MarketStatistic::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(MarketStatistic::Low),
            "median" => Some(MarketStatistic::Median),
            "high" => Some(MarketStatistic::High),
            _ => None,
        }
    }
}

/// Side of the business a calculation prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationType {
    /// What the shop pays a seller
    BuyOffer,
    /// What the shop lists the record for
    SellPrice,
}

impl CalculationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationType::BuyOffer => "buy_offer",
            CalculationType::SellPrice => "sell_price",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy_offer" => Some(CalculationType::BuyOffer),
            "sell_price" => Some(CalculationType::SellPrice),
            _ => None,
        }
    }
}

/// Lifecycle status of a submission item.
///
/// ```text
/// pending ──> accepted ──> received_and_inspected ──> finalized
///    │   └──> rejected
///    └──> counter_offered ──> accepted | rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Accepted,
    Rejected,
    CounterOffered,
    ReceivedAndInspected,
    Finalized,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Accepted => "accepted",
            ItemStatus::Rejected => "rejected",
            ItemStatus::CounterOffered => "counter_offered",
            ItemStatus::ReceivedAndInspected => "received_and_inspected",
            ItemStatus::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "accepted" => Some(ItemStatus::Accepted),
            "rejected" => Some(ItemStatus::Rejected),
            "counter_offered" => Some(ItemStatus::CounterOffered),
            "received_and_inspected" => Some(ItemStatus::ReceivedAndInspected),
            "finalized" => Some(ItemStatus::Finalized),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Rejected | ItemStatus::Finalized)
    }
}

/// Seller's answer to a counter-offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellerResponse {
    Pending,
    Accepted,
    Rejected,
}

impl SellerResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellerResponse::Pending => "pending",
            SellerResponse::Accepted => "accepted",
            SellerResponse::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SellerResponse::Pending),
            "accepted" => Some(SellerResponse::Accepted),
            "rejected" => Some(SellerResponse::Rejected),
            _ => None,
        }
    }
}

/// What happened to a submission item, as recorded in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Submitted,
    Accepted,
    Rejected,
    CounterOffered,
    Inspected,
    Finalized,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Submitted => "submitted",
            HistoryAction::Accepted => "accepted",
            HistoryAction::Rejected => "rejected",
            HistoryAction::CounterOffered => "counter_offered",
            HistoryAction::Inspected => "inspected",
            HistoryAction::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(HistoryAction::Submitted),
            "accepted" => Some(HistoryAction::Accepted),
            "rejected" => Some(HistoryAction::Rejected),
            "counter_offered" => Some(HistoryAction::CounterOffered),
            "inspected" => Some(HistoryAction::Inspected),
            "finalized" => Some(HistoryAction::Finalized),
            _ => None,
        }
    }
}

// ── Catalog and pricing entities ──

/// A record release in the catalog.
#[derive(Debug, Clone)]
pub struct Release {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub genre: Option<String>,
    /// Discogs release id, when the release is linked to the Discogs catalog
    pub discogs_release_id: Option<i64>,
    pub created_at: String,
}

/// Pricing rules for one scope. The most specific active policy wins.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub id: i64,
    pub scope: PolicyScope,
    /// Genre name or release id for scoped policies, `None` for global
    pub scope_value: Option<String>,
    pub buy_source: MarketSource,
    pub buy_statistic: MarketStatistic,
    pub sell_source: MarketSource,
    pub sell_statistic: MarketStatistic,
    /// Multiplier applied to the market price, e.g. 0.55 pays 55%
    pub buy_percentage: f64,
    pub sell_percentage: f64,
    pub buy_min_cap: Option<f64>,
    pub buy_max_cap: Option<f64>,
    pub sell_min_cap: Option<f64>,
    pub sell_max_cap: Option<f64>,
    /// Media vs sleeve weighting for condition adjustments, must sum to 1.0
    pub media_weight: f64,
    pub sleeve_weight: f64,
    /// 0 disables rounding
    pub rounding_increment: f64,
    pub condition_adjustment_enabled: bool,
    /// When set, calculations without market data are flagged for review
    pub requires_manual_review: bool,
    pub version: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PricingPolicy {
    pub fn source_for(&self, calculation_type: CalculationType) -> MarketSource {
        match calculation_type {
            CalculationType::BuyOffer => self.buy_source,
            CalculationType::SellPrice => self.sell_source,
        }
    }

    pub fn statistic_for(&self, calculation_type: CalculationType) -> MarketStatistic {
        match calculation_type {
            CalculationType::BuyOffer => self.buy_statistic,
            CalculationType::SellPrice => self.sell_statistic,
        }
    }

    pub fn percentage_for(&self, calculation_type: CalculationType) -> f64 {
        match calculation_type {
            CalculationType::BuyOffer => self.buy_percentage,
            CalculationType::SellPrice => self.sell_percentage,
        }
    }

    /// (min, max) caps for the given side
    pub fn caps_for(&self, calculation_type: CalculationType) -> (Option<f64>, Option<f64>) {
        match calculation_type {
            CalculationType::BuyOffer => (self.buy_min_cap, self.buy_max_cap),
            CalculationType::SellPrice => (self.sell_min_cap, self.sell_max_cap),
        }
    }
}

/// One grade on the condition scale (Goldmine-style, Mint down to Poor).
#[derive(Debug, Clone)]
pub struct ConditionTier {
    pub id: i64,
    pub name: String,
    pub display_order: i64,
    /// Multiplier applied when the media carries this grade
    pub media_adjustment: f64,
    /// Multiplier applied when the sleeve carries this grade
    pub sleeve_adjustment: f64,
}

/// Optional extra discount a policy grants for a specific condition tier.
/// A `None` side means no discount on that side for this tier.
#[derive(Debug, Clone)]
pub struct PolicyConditionDiscount {
    pub id: i64,
    pub policy_id: i64,
    pub condition_tier_id: i64,
    pub buy_discount_percentage: Option<f64>,
    pub sell_discount_percentage: Option<f64>,
}

impl PolicyConditionDiscount {
    pub fn percentage_for(&self, calculation_type: CalculationType) -> Option<f64> {
        match calculation_type {
            CalculationType::BuyOffer => self.buy_discount_percentage,
            CalculationType::SellPrice => self.sell_discount_percentage,
        }
    }
}

/// Cached marketplace statistics for one release and one concrete source.
/// All statistics are nullable so that "we checked and found nothing" is
/// recorded with a timestamp too.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub id: i64,
    pub release_id: i64,
    pub source: MarketSource,
    pub stat_low: Option<f64>,
    pub stat_median: Option<f64>,
    pub stat_high: Option<f64>,
    pub fetched_at: String,
}

impl MarketSnapshot {
    pub fn stat(&self, statistic: MarketStatistic) -> Option<f64> {
        match statistic {
            MarketStatistic::Low => self.stat_low,
            MarketStatistic::Median => self.stat_median,
            MarketStatistic::High => self.stat_high,
        }
    }

    /// True once the snapshot is older than `max_age_hours`. Unparseable
    /// timestamps count as stale.
    pub fn is_stale(&self, max_age_hours: i64) -> bool {
        match NaiveDateTime::parse_from_str(&self.fetched_at, DB_TIMESTAMP_FORMAT) {
            Ok(fetched) => {
                let age = Utc::now().signed_duration_since(fetched.and_utc());
                age > Duration::hours(max_age_hours)
            }
            Err(_) => true,
        }
    }
}

/// Low/median/high statistics reduced from a set of observed prices,
/// before they are persisted as a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketStats {
    pub stat_low: Option<f64>,
    pub stat_median: Option<f64>,
    pub stat_high: Option<f64>,
}

impl MarketStats {
    pub fn stat(&self, statistic: MarketStatistic) -> Option<f64> {
        match statistic {
            MarketStatistic::Low => self.stat_low,
            MarketStatistic::Median => self.stat_median,
            MarketStatistic::High => self.stat_high,
        }
    }

    /// Reduces observed prices to low/median/high. Returns `None` when the
    /// input is empty. The median of an even count is the mean of the two
    /// middle values.
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let median = if values.len() % 2 == 1 {
            values[values.len() / 2]
        } else {
            let upper = values.len() / 2;
            (values[upper - 1] + values[upper]) / 2.0
        };
        Some(MarketStats {
            stat_low: values.first().copied(),
            stat_median: Some(median),
            stat_high: values.last().copied(),
        })
    }
}

/// Append-only record of one price calculation.
#[derive(Debug, Clone)]
pub struct PricingCalculationAudit {
    pub id: i64,
    pub release_id: i64,
    pub policy_id: i64,
    /// `None` when the price came from a live fetch or the fallback floor
    pub market_snapshot_id: Option<i64>,
    pub calculation_type: CalculationType,
    pub condition_media: String,
    pub condition_sleeve: String,
    pub market_price: Option<f64>,
    pub final_price: f64,
    /// Full step-by-step breakdown as JSON
    pub breakdown: String,
    pub created_at: String,
}

// ── Submission entities ──

/// A batch of records one seller offers to the shop.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub submission_number: String,
    pub seller_email: String,
    pub created_at: String,
}

/// One release within a submission, with its declared condition and the
/// offer attached to it.
#[derive(Debug, Clone)]
pub struct SubmissionItem {
    pub id: i64,
    pub submission_id: i64,
    pub release_id: i64,
    pub quantity: i64,
    /// Condition the seller declared
    pub condition_media: String,
    pub condition_sleeve: String,
    /// Offer computed at intake, never overwritten
    pub auto_offer_price: f64,
    /// Condition confirmed by the shop, set on accept or inspection
    pub final_condition_media: Option<String>,
    pub final_condition_sleeve: Option<String>,
    /// Offer actually on the table once the shop adjusted or countered
    pub final_offer_price: Option<f64>,
    pub status: ItemStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl SubmissionItem {
    /// The offer currently standing: the adjusted price when one exists,
    /// otherwise the automatic intake offer.
    pub fn current_offer(&self) -> f64 {
        self.final_offer_price.unwrap_or(self.auto_offer_price)
    }
}

/// Append-only trail of everything that happened to a submission item.
/// Only `seller_response` is ever updated in place, when the seller answers
/// a counter-offer.
#[derive(Debug, Clone)]
pub struct SubmissionHistoryEntry {
    pub id: i64,
    pub submission_item_id: i64,
    pub action_type: HistoryAction,
    pub admin_notes: Option<String>,
    pub adjusted_price: Option<f64>,
    pub seller_response: Option<SellerResponse>,
    pub created_at: String,
}

/// A sellable inventory lot created from a finalized submission item.
#[derive(Debug, Clone)]
pub struct Lot {
    pub id: i64,
    pub lot_number: String,
    pub release_id: i64,
    pub quantity: i64,
    pub condition_media: String,
    pub condition_sleeve: String,
    /// What the shop paid per unit
    pub acquisition_price: f64,
    pub source_item_id: i64,
    pub created_at: String,
}
