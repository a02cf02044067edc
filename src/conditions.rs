//! Condition adjustment calculation.
//!
//! A record in worse shape is worth less. The adjustment starts from the
//! tier multipliers of the declared media and sleeve grades, weighted by
//! the policy's media/sleeve split, then shrinks further for every
//! distinct tier the policy grants an extra discount on.

use crate::error::Result;
use crate::models::{CalculationType, PricingPolicy};
use crate::storage::Storage;
use crate::tiers;

/// Breakdown of one condition adjustment.
#[derive(Debug, Clone)]
pub struct ConditionAdjustment {
    pub media_adjustment: f64,
    pub sleeve_adjustment: f64,
    /// media * media_weight + sleeve * sleeve_weight
    pub weighted_base: f64,
    /// Product of (1 - discount/100) over all applied discounts
    pub discount_multiplier: f64,
    /// Representative discount percentage for display, `None` when no
    /// discount applied
    pub display_discount: Option<f64>,
    /// weighted_base * discount_multiplier
    pub final_adjustment: f64,
}

impl ConditionAdjustment {
    /// Adjustment that leaves the price untouched, used when the policy
    /// has condition handling disabled.
    pub fn neutral() -> Self {
        ConditionAdjustment {
            media_adjustment: 1.0,
            sleeve_adjustment: 1.0,
            weighted_base: 1.0,
            discount_multiplier: 1.0,
            display_discount: None,
            final_adjustment: 1.0,
        }
    }
}

/// Computes the combined condition adjustment for one calculation.
///
/// Unknown grade names fall back to a neutral 1.0 multiplier on that side.
/// Discounts are looked up once per distinct tier, so media and sleeve
/// sharing a grade do not compound the same discount twice.
pub fn compute_condition_adjustment(
    storage: &dyn Storage,
    policy: &PricingPolicy,
    condition_media: &str,
    condition_sleeve: &str,
    calculation_type: CalculationType,
) -> Result<ConditionAdjustment> {
    if !policy.condition_adjustment_enabled {
        return Ok(ConditionAdjustment::neutral());
    }

    let media_tier = tiers::find_tier(storage, condition_media)?;
    let sleeve_tier = tiers::find_tier(storage, condition_sleeve)?;
    if media_tier.is_none() {
        log::debug!("Unknown media grade '{condition_media}', using neutral adjustment");
    }
    if sleeve_tier.is_none() {
        log::debug!("Unknown sleeve grade '{condition_sleeve}', using neutral adjustment");
    }

    let media_adjustment = media_tier.as_ref().map_or(1.0, |t| t.media_adjustment);
    let sleeve_adjustment = sleeve_tier.as_ref().map_or(1.0, |t| t.sleeve_adjustment);
    let weighted_base =
        media_adjustment * policy.media_weight + sleeve_adjustment * policy.sleeve_weight;

    let mut tier_ids: Vec<i64> = Vec::new();
    for tier in [&media_tier, &sleeve_tier].into_iter().flatten() {
        if !tier_ids.contains(&tier.id) {
            tier_ids.push(tier.id);
        }
    }

    let mut discount_multiplier = 1.0;
    let mut applied: Vec<f64> = Vec::new();
    for tier_id in tier_ids {
        if let Some(discount) = storage.get_policy_discount(policy.id, tier_id)? {
            if let Some(percent) = discount.percentage_for(calculation_type) {
                discount_multiplier *= 1.0 - percent / 100.0;
                applied.push(percent);
            }
        }
    }

    let display_discount = match applied.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, second, ..] => Some((first + second) / 2.0),
    };

    Ok(ConditionAdjustment {
        media_adjustment,
        sleeve_adjustment,
        weighted_base,
        discount_multiplier,
        display_discount,
        final_adjustment: weighted_base * discount_multiplier,
    })
}
