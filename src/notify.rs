//! Seller notifications.
//!
//! Counter-offers trigger a best-effort notification to the seller. The
//! workflow treats delivery as fire and forget: a failed send is logged
//! and never rolls back the state change that caused it.

/// Everything a notification channel needs to tell a seller about a
/// counter-offer.
#[derive(Debug, Clone)]
pub struct CounterOfferNotice {
    pub seller_email: String,
    pub submission_number: String,
    pub title: String,
    pub artist: String,
    pub quantity: i64,
    pub new_price: f64,
}

/// Delivery channel for counter-offer notices.
pub trait CounterOfferNotifier {
    /// Returns whether the notice went out. Implementations should not
    /// panic or block for long; the workflow ignores failures beyond
    /// logging them.
    fn send_counter_offer(&self, notice: &CounterOfferNotice) -> bool;
}

/// Default channel: writes the notice to the log instead of sending
/// anything. Stands in until a real mail transport is configured.
pub struct LogNotifier;

impl CounterOfferNotifier for LogNotifier {
    fn send_counter_offer(&self, notice: &CounterOfferNotice) -> bool {
        log::info!(
            "[DRY RUN] Would notify {} about counter-offer on submission {}: {} - {} x{} at {:.2}",
            notice.seller_email,
            notice.submission_number,
            notice.artist,
            notice.title,
            notice.quantity,
            notice.new_price
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_reports_success() {
        let notice = CounterOfferNotice {
            seller_email: "seller@example.com".to_string(),
            submission_number: "SUB-001".to_string(),
            title: "Paranoid".to_string(),
            artist: "Black Sabbath".to_string(),
            quantity: 1,
            new_price: 18.5,
        };
        assert!(LogNotifier.send_counter_offer(&notice));
    }
}
