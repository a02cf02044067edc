//! Pricing formula engine.
//!
//! Combines the resolved policy, market price and condition adjustment
//! into a final price:
//!
//! ```text
//! price = market_price * percentage * condition_adjustment
//! ```
//!
//! then rounds to the policy increment and clamps into the policy caps.
//! When no market data can be resolved the price falls back to the
//! side's min cap, or a small floor, so a quote is always produced.
//! Every calculation is written to the audit trail before it is returned.

use serde::Serialize;

use crate::audit;
use crate::conditions::{self, ConditionAdjustment};
use crate::error::{BrokerError, Result};
use crate::market::{self, LiveMarketData, MarketQuote};
use crate::models::{CalculationType, PricingPolicy, Release};
use crate::policy;
use crate::storage::{NewCalculationAudit, Storage};

/// Fallback price when market data is missing and the policy has no
/// min cap for the side. Keeps offers nonzero so items stay actionable.
pub const MISSING_DATA_FLOOR: f64 = 0.5;

/// Rounds to the nearest multiple of `increment`. An increment of zero
/// disables rounding.
pub fn round_to_increment(price: f64, increment: f64) -> f64 {
    if increment > 0.0 {
        (price / increment).round() * increment
    } else {
        price
    }
}

fn clamp_to_caps(price: f64, min_cap: Option<f64>, max_cap: Option<f64>) -> f64 {
    let mut clamped = price;
    if let Some(min) = min_cap {
        if clamped < min {
            clamped = min;
        }
    }
    if let Some(max) = max_cap {
        if clamped > max {
            clamped = max;
        }
    }
    clamped
}

/// Step-by-step record of one calculation, serialized into the audit row.
#[derive(Debug, Clone, Serialize)]
pub struct PriceBreakdown {
    pub market_source: String,
    pub market_statistic: String,
    pub market_price: Option<f64>,
    pub live_fetched: bool,
    pub formula_percentage: f64,
    pub media_adjustment: f64,
    pub sleeve_adjustment: f64,
    pub media_weight: f64,
    pub sleeve_weight: f64,
    pub weighted_base_adjustment: f64,
    pub discount_multiplier: f64,
    pub discount_percentage: Option<f64>,
    pub condition_adjustment: f64,
    pub price_before_rounding: f64,
    pub rounding_increment: f64,
    pub min_cap: Option<f64>,
    pub max_cap: Option<f64>,
    pub final_price: f64,
    pub requires_manual_review: bool,
}

/// A priced calculation, audit row already written.
#[derive(Debug, Clone)]
pub struct PriceCalculation {
    pub final_price: f64,
    /// True when the policy demands review and no market data backed
    /// the price
    pub requires_manual_review: bool,
    pub calculation_type: CalculationType,
    pub policy_id: i64,
    pub policy_version: i64,
    pub audit_id: i64,
    pub breakdown: PriceBreakdown,
}

/// Buy offer and sell price for the same release and condition.
#[derive(Debug, Clone)]
pub struct ReleaseQuote {
    pub buy: PriceCalculation,
    pub sell: PriceCalculation,
}

/// The deterministic pricing pipeline. Holds its collaborators by
/// reference, so one engine serves any number of calculations.
pub struct PricingEngine<'a> {
    storage: &'a dyn Storage,
    live: &'a dyn LiveMarketData,
}

impl<'a> PricingEngine<'a> {
    pub fn new(storage: &'a dyn Storage, live: &'a dyn LiveMarketData) -> Self {
        PricingEngine { storage, live }
    }

    /// Prices one side for a release, resolving the governing policy first.
    pub fn calculate(
        &self,
        release_id: i64,
        condition_media: &str,
        condition_sleeve: &str,
        calculation_type: CalculationType,
    ) -> Result<PriceCalculation> {
        let release = self
            .storage
            .get_release(release_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("release {release_id}")))?;
        let policy = policy::resolve_policy(self.storage, release_id, release.genre.as_deref())?
            .ok_or_else(|| {
                BrokerError::NotFound(format!("no active pricing policy covers release {release_id}"))
            })?;
        self.calculate_with_policy(
            &release,
            &policy,
            condition_media,
            condition_sleeve,
            calculation_type,
        )
    }

    /// Both sides at once, for quote displays.
    pub fn quote(
        &self,
        release_id: i64,
        condition_media: &str,
        condition_sleeve: &str,
    ) -> Result<ReleaseQuote> {
        let buy = self.calculate(
            release_id,
            condition_media,
            condition_sleeve,
            CalculationType::BuyOffer,
        )?;
        let sell = self.calculate(
            release_id,
            condition_media,
            condition_sleeve,
            CalculationType::SellPrice,
        )?;
        Ok(ReleaseQuote { buy, sell })
    }

    fn calculate_with_policy(
        &self,
        release: &Release,
        policy: &PricingPolicy,
        condition_media: &str,
        condition_sleeve: &str,
        calculation_type: CalculationType,
    ) -> Result<PriceCalculation> {
        let market: MarketQuote =
            market::resolve_market_price(self.storage, self.live, release, policy, calculation_type)?;
        let adjustment: ConditionAdjustment = conditions::compute_condition_adjustment(
            self.storage,
            policy,
            condition_media,
            condition_sleeve,
            calculation_type,
        )?;

        let percentage = policy.percentage_for(calculation_type);
        let (min_cap, max_cap) = policy.caps_for(calculation_type);
        let requires_manual_review = market.price.is_none() && policy.requires_manual_review;

        let price_before_rounding = match market.price {
            Some(market_price) if market_price > 0.0 => {
                market_price * percentage * adjustment.final_adjustment
            }
            _ => min_cap.unwrap_or(MISSING_DATA_FLOOR),
        };
        let rounded = round_to_increment(price_before_rounding, policy.rounding_increment);
        let final_price = clamp_to_caps(rounded, min_cap, max_cap);

        let breakdown = PriceBreakdown {
            market_source: market.source.as_str().to_string(),
            market_statistic: market.statistic.as_str().to_string(),
            market_price: market.price,
            live_fetched: market.live_fetched,
            formula_percentage: percentage,
            media_adjustment: adjustment.media_adjustment,
            sleeve_adjustment: adjustment.sleeve_adjustment,
            media_weight: policy.media_weight,
            sleeve_weight: policy.sleeve_weight,
            weighted_base_adjustment: adjustment.weighted_base,
            discount_multiplier: adjustment.discount_multiplier,
            discount_percentage: adjustment.display_discount,
            condition_adjustment: adjustment.final_adjustment,
            price_before_rounding,
            rounding_increment: policy.rounding_increment,
            min_cap,
            max_cap,
            final_price,
            requires_manual_review,
        };

        let audit_id = audit::record_calculation(
            self.storage,
            &NewCalculationAudit {
                release_id: release.id,
                policy_id: policy.id,
                market_snapshot_id: market.snapshot_id,
                calculation_type,
                condition_media: condition_media.to_string(),
                condition_sleeve: condition_sleeve.to_string(),
                market_price: market.price,
                final_price,
                breakdown: serde_json::to_string(&breakdown)?,
            },
        )?;

        log::debug!(
            "Priced release {} {} at {:.2} (policy {} v{}, market {:?})",
            release.id,
            calculation_type.as_str(),
            final_price,
            policy.id,
            policy.version,
            market.price
        );

        Ok(PriceCalculation {
            final_price,
            requires_manual_review,
            calculation_type,
            policy_id: policy.id,
            policy_version: policy.version,
            audit_id,
            breakdown,
        })
    }
}
