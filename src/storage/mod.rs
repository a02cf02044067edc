//! Storage interface for the brokerage core.
//!
//! The pricing and workflow components talk to persistence exclusively
//! through the [`Storage`] trait so they can be exercised against an
//! in-memory database in tests. [`sqlite::SqliteStorage`] is the shipped
//! implementation.

pub mod sqlite;

use crate::error::{BrokerError, Result};
use crate::models::{
    CalculationType, ConditionTier, HistoryAction, ItemStatus, MarketSnapshot, MarketSource,
    MarketStatistic, PolicyConditionDiscount, PolicyScope, PricingCalculationAudit, PricingPolicy,
    Release, SellerResponse, Submission, SubmissionHistoryEntry, SubmissionItem,
};

// ── Creation payloads ──

#[derive(Debug, Clone)]
pub struct NewRelease {
    pub title: String,
    pub artist: String,
    pub genre: Option<String>,
    pub discogs_release_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewPricingPolicy {
    pub scope: PolicyScope,
    pub scope_value: Option<String>,
    pub buy_source: MarketSource,
    pub buy_statistic: MarketStatistic,
    pub sell_source: MarketSource,
    pub sell_statistic: MarketStatistic,
    pub buy_percentage: f64,
    pub sell_percentage: f64,
    pub buy_min_cap: Option<f64>,
    pub buy_max_cap: Option<f64>,
    pub sell_min_cap: Option<f64>,
    pub sell_max_cap: Option<f64>,
    pub media_weight: f64,
    pub sleeve_weight: f64,
    pub rounding_increment: f64,
    pub condition_adjustment_enabled: bool,
    pub requires_manual_review: bool,
    pub is_active: bool,
}

impl NewPricingPolicy {
    /// Checks the invariants a policy must satisfy before it is stored.
    pub fn validate(&self) -> Result<()> {
        match self.scope {
            PolicyScope::Global => {
                if self.scope_value.is_some() {
                    return Err(BrokerError::Validation(
                        "global policies must not carry a scope value".to_string(),
                    ));
                }
            }
            PolicyScope::Genre | PolicyScope::Release => {
                if self.scope_value.as_deref().map_or(true, |v| v.is_empty()) {
                    return Err(BrokerError::Validation(format!(
                        "{}-scoped policies require a scope value",
                        self.scope.as_str()
                    )));
                }
            }
        }
        if self.media_weight < 0.0 || self.sleeve_weight < 0.0 {
            return Err(BrokerError::Validation(
                "condition weights must not be negative".to_string(),
            ));
        }
        let weight_sum = self.media_weight + self.sleeve_weight;
        if (weight_sum - 1.0).abs() > 0.001 {
            return Err(BrokerError::Validation(format!(
                "media and sleeve weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if self.rounding_increment < 0.0 {
            return Err(BrokerError::Validation(
                "rounding increment must not be negative".to_string(),
            ));
        }
        for (label, min, max) in [
            ("buy", self.buy_min_cap, self.buy_max_cap),
            ("sell", self.sell_min_cap, self.sell_max_cap),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(BrokerError::Validation(format!(
                        "{label} min cap {min} exceeds max cap {max}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewConditionTier {
    pub name: String,
    pub display_order: i64,
    pub media_adjustment: f64,
    pub sleeve_adjustment: f64,
}

#[derive(Debug, Clone)]
pub struct NewPolicyDiscount {
    pub policy_id: i64,
    pub condition_tier_id: i64,
    pub buy_discount_percentage: Option<f64>,
    pub sell_discount_percentage: Option<f64>,
}

impl NewPolicyDiscount {
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("buy", self.buy_discount_percentage),
            ("sell", self.sell_discount_percentage),
        ] {
            if let Some(percent) = value {
                if !(0.0..=100.0).contains(&percent) {
                    return Err(BrokerError::Validation(format!(
                        "{label} discount must be between 0 and 100, got {percent}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewMarketSnapshot {
    pub release_id: i64,
    /// Must be a concrete source; hybrid is never persisted
    pub source: MarketSource,
    pub stat_low: Option<f64>,
    pub stat_median: Option<f64>,
    pub stat_high: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewCalculationAudit {
    pub release_id: i64,
    pub policy_id: i64,
    pub market_snapshot_id: Option<i64>,
    pub calculation_type: CalculationType,
    pub condition_media: String,
    pub condition_sleeve: String,
    pub market_price: Option<f64>,
    pub final_price: f64,
    pub breakdown: String,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub submission_number: String,
    pub seller_email: String,
}

#[derive(Debug, Clone)]
pub struct NewSubmissionItem {
    pub submission_id: i64,
    pub release_id: i64,
    pub quantity: i64,
    pub condition_media: String,
    pub condition_sleeve: String,
    pub auto_offer_price: f64,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub submission_item_id: i64,
    pub action_type: HistoryAction,
    pub admin_notes: Option<String>,
    pub adjusted_price: Option<f64>,
    pub seller_response: Option<SellerResponse>,
}

/// Guarded update of a submission item. `None` fields keep the stored
/// value untouched.
#[derive(Debug, Clone)]
pub struct ItemTransition {
    pub status: ItemStatus,
    pub final_condition_media: Option<String>,
    pub final_condition_sleeve: Option<String>,
    pub final_offer_price: Option<f64>,
}

impl ItemTransition {
    /// A transition that only changes the status.
    pub fn to_status(status: ItemStatus) -> Self {
        ItemTransition {
            status,
            final_condition_media: None,
            final_condition_sleeve: None,
            final_offer_price: None,
        }
    }
}

// ── Storage trait ──

/// Persistence operations the brokerage core depends on.
pub trait Storage {
    // Releases
    fn create_release(&self, release: &NewRelease) -> Result<Release>;
    fn get_release(&self, id: i64) -> Result<Option<Release>>;
    fn list_releases(&self) -> Result<Vec<Release>>;

    // Pricing policies. Updates bump the version and never delete;
    // retiring a policy means clearing its active flag.
    fn create_policy(&self, policy: &NewPricingPolicy) -> Result<PricingPolicy>;
    fn update_policy(&self, id: i64, policy: &NewPricingPolicy) -> Result<PricingPolicy>;
    fn get_policy(&self, id: i64) -> Result<Option<PricingPolicy>>;
    /// Most recently created active policy for the scope, if any.
    fn find_active_policy(
        &self,
        scope: PolicyScope,
        scope_value: Option<&str>,
    ) -> Result<Option<PricingPolicy>>;

    // Condition tiers
    fn create_condition_tier(&self, tier: &NewConditionTier) -> Result<ConditionTier>;
    /// All tiers in display order.
    fn list_condition_tiers(&self) -> Result<Vec<ConditionTier>>;
    fn get_condition_tier_by_name(&self, name: &str) -> Result<Option<ConditionTier>>;

    // Per-policy condition discounts
    fn upsert_policy_discount(&self, discount: &NewPolicyDiscount) -> Result<PolicyConditionDiscount>;
    fn get_policy_discount(
        &self,
        policy_id: i64,
        condition_tier_id: i64,
    ) -> Result<Option<PolicyConditionDiscount>>;

    // Market snapshots, one row per release and concrete source
    fn upsert_snapshot(&self, snapshot: &NewMarketSnapshot) -> Result<MarketSnapshot>;
    fn get_snapshot(&self, release_id: i64, source: MarketSource) -> Result<Option<MarketSnapshot>>;

    // Calculation audit trail, append-only
    fn append_audit(&self, audit: &NewCalculationAudit) -> Result<i64>;
    fn get_audit(&self, id: i64) -> Result<Option<PricingCalculationAudit>>;
    fn audits_for_release(&self, release_id: i64) -> Result<Vec<PricingCalculationAudit>>;
    /// Deletes audit rows older than the cutoff timestamp, returns the count.
    fn purge_audits_before(&self, cutoff: &str) -> Result<usize>;

    // Submissions
    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission>;
    fn get_submission(&self, id: i64) -> Result<Option<Submission>>;
    fn create_submission_item(&self, item: &NewSubmissionItem) -> Result<SubmissionItem>;
    fn get_submission_item(&self, id: i64) -> Result<Option<SubmissionItem>>;
    fn items_for_submission(&self, submission_id: i64) -> Result<Vec<SubmissionItem>>;
    /// Applies the transition only while the item still has the expected
    /// status. Returns false when a concurrent writer got there first.
    fn apply_item_transition(
        &self,
        item_id: i64,
        expected: ItemStatus,
        transition: &ItemTransition,
    ) -> Result<bool>;

    // Submission history
    fn append_history(&self, entry: &NewHistoryEntry) -> Result<i64>;
    fn history_for_item(&self, item_id: i64) -> Result<Vec<SubmissionHistoryEntry>>;
    /// Fills in the seller response on the latest pending counter-offer
    /// history row. Returns false when no such row exists.
    fn resolve_pending_counter(&self, item_id: i64, response: SellerResponse) -> Result<bool>;
}

#[cfg(test)]
pub use tests::{make_test_policy, make_test_release, make_test_snapshot, make_test_tier};
