//! Calculation audit trail.
//!
//! Every price the engine produces lands here with its full breakdown,
//! including floor fallbacks where no market data existed. Rows are never
//! updated; the only write besides append is the retention purge.

use crate::error::Result;
use crate::models::PricingCalculationAudit;
use crate::storage::{NewCalculationAudit, Storage};

/// Appends one calculation to the audit trail and returns the row id.
pub fn record_calculation(storage: &dyn Storage, audit: &NewCalculationAudit) -> Result<i64> {
    let id = storage.append_audit(audit)?;
    log::debug!(
        "Audit {}: {} for release {} -> {:.2}",
        id,
        audit.calculation_type.as_str(),
        audit.release_id,
        audit.final_price
    );
    Ok(id)
}

/// All recorded calculations for a release, oldest first.
pub fn calculations_for_release(
    storage: &dyn Storage,
    release_id: i64,
) -> Result<Vec<PricingCalculationAudit>> {
    storage.audits_for_release(release_id)
}

/// Retention maintenance: drops audit rows recorded before the cutoff
/// timestamp (`YYYY-MM-DD HH:MM:SS`, UTC). Returns the number deleted.
pub fn purge_before(storage: &dyn Storage, cutoff: &str) -> Result<usize> {
    let deleted = storage.purge_audits_before(cutoff)?;
    if deleted > 0 {
        log::info!("Purged {deleted} audit rows older than {cutoff}");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalculationType;
    use crate::storage::sqlite::SqliteStorage;
    use crate::storage::{make_test_policy, make_test_release};

    fn make_audit(release_id: i64, policy_id: i64, price: f64) -> NewCalculationAudit {
        NewCalculationAudit {
            release_id,
            policy_id,
            market_snapshot_id: None,
            calculation_type: CalculationType::SellPrice,
            condition_media: "Near Mint".to_string(),
            condition_sleeve: "Near Mint".to_string(),
            market_price: Some(price * 2.0),
            final_price: price,
            breakdown: "{}".to_string(),
        }
    }

    #[test]
    fn test_record_and_list() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let release = storage
            .create_release(&make_test_release("Harvest", "Neil Young"))
            .unwrap();
        let policy = storage.create_policy(&make_test_policy()).unwrap();

        record_calculation(&storage, &make_audit(release.id, policy.id, 10.0)).unwrap();
        record_calculation(&storage, &make_audit(release.id, policy.id, 12.0)).unwrap();

        let trail = calculations_for_release(&storage, release.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].final_price, 10.0);
        assert_eq!(trail[1].final_price, 12.0);
    }

    #[test]
    fn test_purge_respects_cutoff() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let release = storage
            .create_release(&make_test_release("Harvest", "Neil Young"))
            .unwrap();
        let policy = storage.create_policy(&make_test_policy()).unwrap();
        record_calculation(&storage, &make_audit(release.id, policy.id, 10.0)).unwrap();

        assert_eq!(purge_before(&storage, "2000-01-01 00:00:00").unwrap(), 0);
        assert_eq!(calculations_for_release(&storage, release.id).unwrap().len(), 1);

        assert_eq!(purge_before(&storage, "9999-01-01 00:00:00").unwrap(), 1);
        assert!(calculations_for_release(&storage, release.id)
            .unwrap()
            .is_empty());
    }
}
