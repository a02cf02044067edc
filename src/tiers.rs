//! Condition tier lookups and the default grading scale.

use crate::error::Result;
use crate::models::ConditionTier;
use crate::storage::{NewConditionTier, Storage};

/// Goldmine-style grading ladder seeded into fresh databases.
/// (name, display order, adjustment applied to both media and sleeve)
const DEFAULT_TIERS: &[(&str, i64, f64)] = &[
    ("Mint", 1, 1.1),
    ("Near Mint", 2, 1.0),
    ("Very Good Plus", 3, 0.85),
    ("Very Good", 4, 0.7),
    ("Good", 5, 0.5),
    ("Fair", 6, 0.3),
    ("Poor", 7, 0.15),
];

/// All tiers, best grade first.
pub fn list_tiers(storage: &dyn Storage) -> Result<Vec<ConditionTier>> {
    storage.list_condition_tiers()
}

/// Exact-name lookup. Unknown grades resolve to `None`, callers decide
/// whether that is an error or a neutral adjustment.
pub fn find_tier(storage: &dyn Storage, name: &str) -> Result<Option<ConditionTier>> {
    storage.get_condition_tier_by_name(name)
}

/// Seeds the default grading scale when the tier table is empty.
/// Returns the number of tiers created.
pub fn ensure_default_tiers(storage: &dyn Storage) -> Result<usize> {
    if !storage.list_condition_tiers()?.is_empty() {
        return Ok(0);
    }
    for (name, display_order, adjustment) in DEFAULT_TIERS {
        storage.create_condition_tier(&NewConditionTier {
            name: (*name).to_string(),
            display_order: *display_order,
            media_adjustment: *adjustment,
            sleeve_adjustment: *adjustment,
        })?;
    }
    log::info!("Seeded {} default condition tiers", DEFAULT_TIERS.len());
    Ok(DEFAULT_TIERS.len())
}
