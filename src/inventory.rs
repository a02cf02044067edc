//! Bridge from finalized submission items to sellable inventory.

use crate::error::Result;
use crate::models::SubmissionItem;

/// Creates inventory lots out of finalized submission items.
/// [`crate::storage::sqlite::SqliteStorage`] implements this against the
/// lots table; a larger deployment could forward to a warehouse system
/// instead.
pub trait InventoryWriter {
    /// Creates one lot from a finalized item, carrying its inspected
    /// condition and the agreed acquisition price, and returns the lot
    /// number. The workflow calls this at most once per item.
    fn create_lot_from_item(&self, item: &SubmissionItem) -> Result<String>;
}

/// Sequential lot numbers in the `LOT-000042` form.
pub fn format_lot_number(sequence: i64) -> String {
    format!("LOT-{sequence:06}")
}
