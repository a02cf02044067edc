//! Submission item lifecycle.
//!
//! Items move through a fixed state machine:
//!
//! ```text
//! pending ──> accepted ──> received_and_inspected ──> finalized
//!    │   └──> rejected
//!    └──> counter_offered ──> accepted | rejected   (seller response)
//! ```
//!
//! Every transition is guarded against concurrent writers through the
//! storage layer's conditional update and leaves a history entry behind.
//! Re-pricing happens in exactly one place, the Accept transition, and
//! only when the confirmed condition differs from what the seller
//! declared.

use crate::engine::PricingEngine;
use crate::error::{BrokerError, Result};
use crate::inventory::InventoryWriter;
use crate::models::{
    CalculationType, HistoryAction, ItemStatus, SellerResponse, Submission, SubmissionItem,
};
use crate::notify::{CounterOfferNotice, CounterOfferNotifier};
use crate::storage::{ItemTransition, NewHistoryEntry, NewSubmissionItem, Storage};

/// Caller input for the Accept transition. Leaving the conditions `None`
/// confirms the seller-declared grades, an override price skips the
/// recalculation entirely.
#[derive(Debug, Clone, Default)]
pub struct AcceptRequest {
    pub final_condition_media: Option<String>,
    pub final_condition_sleeve: Option<String>,
    pub override_price: Option<f64>,
    pub admin_notes: Option<String>,
}

/// Per-item outcome of a bulk operation. One item failing never stops
/// the rest of the submission.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: Vec<i64>,
    pub failed: Vec<(i64, String)>,
    /// Items not in an actionable status
    pub skipped: usize,
}

/// Orchestrates the negotiation workflow over its collaborators.
pub struct SubmissionWorkflow<'a> {
    storage: &'a dyn Storage,
    engine: &'a PricingEngine<'a>,
    notifier: &'a dyn CounterOfferNotifier,
    inventory: &'a dyn InventoryWriter,
}

impl<'a> SubmissionWorkflow<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        engine: &'a PricingEngine<'a>,
        notifier: &'a dyn CounterOfferNotifier,
        inventory: &'a dyn InventoryWriter,
    ) -> Self {
        SubmissionWorkflow {
            storage,
            engine,
            notifier,
            inventory,
        }
    }

    /// Intake: quotes a buy offer for the declared condition and creates
    /// the item in `pending`. Fails when no policy covers the release,
    /// sellers should not see an unpriced item.
    pub fn submit_item(
        &self,
        submission_id: i64,
        release_id: i64,
        quantity: i64,
        condition_media: &str,
        condition_sleeve: &str,
    ) -> Result<SubmissionItem> {
        if quantity <= 0 {
            return Err(BrokerError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        self.require_submission(submission_id)?;

        let calc = self.engine.calculate(
            release_id,
            condition_media,
            condition_sleeve,
            CalculationType::BuyOffer,
        )?;
        let item = self.storage.create_submission_item(&NewSubmissionItem {
            submission_id,
            release_id,
            quantity,
            condition_media: condition_media.to_string(),
            condition_sleeve: condition_sleeve.to_string(),
            auto_offer_price: calc.final_price,
        })?;
        self.storage.append_history(&NewHistoryEntry {
            submission_item_id: item.id,
            action_type: HistoryAction::Submitted,
            admin_notes: calc
                .requires_manual_review
                .then(|| "Automatic offer flagged for manual review".to_string()),
            adjusted_price: Some(calc.final_price),
            seller_response: None,
        })?;
        log::info!(
            "Item {} submitted: release {} x{} quoted at {:.2}",
            item.id,
            release_id,
            quantity,
            calc.final_price
        );
        Ok(item)
    }

    /// Accept transition, allowed from `pending` and `counter_offered`.
    ///
    /// A condition change without an override price triggers a re-quote;
    /// when the re-quote fails the standing offer is kept and the failure
    /// is only logged, acceptance must not bounce because a marketplace
    /// or policy lookup is having a bad day.
    pub fn accept_item(&self, item_id: i64, request: &AcceptRequest) -> Result<SubmissionItem> {
        if let Some(price) = request.override_price {
            if price <= 0.0 {
                return Err(BrokerError::Validation(format!(
                    "override price must be positive, got {price}"
                )));
            }
        }
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::Pending, ItemStatus::CounterOffered], "accept")?;

        let final_media = request
            .final_condition_media
            .clone()
            .unwrap_or_else(|| item.condition_media.clone());
        let final_sleeve = request
            .final_condition_sleeve
            .clone()
            .unwrap_or_else(|| item.condition_sleeve.clone());
        let condition_changed =
            final_media != item.condition_media || final_sleeve != item.condition_sleeve;

        let mut notes: Vec<String> = Vec::new();
        if let Some(admin_notes) = &request.admin_notes {
            notes.push(admin_notes.clone());
        }

        let mut price = request.override_price.unwrap_or_else(|| item.current_offer());
        if condition_changed && request.override_price.is_none() {
            match self.engine.calculate(
                item.release_id,
                &final_media,
                &final_sleeve,
                CalculationType::BuyOffer,
            ) {
                Ok(recalc) => {
                    if recalc.final_price != price {
                        notes.push(format!(
                            "Condition changed from {}/{} to {}/{}, offer recalculated from {:.2} to {:.2}",
                            item.condition_media,
                            item.condition_sleeve,
                            final_media,
                            final_sleeve,
                            price,
                            recalc.final_price
                        ));
                        price = recalc.final_price;
                    } else {
                        notes.push(format!(
                            "Condition changed to {final_media}/{final_sleeve}, recalculated offer unchanged"
                        ));
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Re-quote for item {item_id} failed, keeping offer {price:.2}: {e}"
                    );
                    notes.push(format!(
                        "Condition changed to {final_media}/{final_sleeve} but recalculation failed, offer kept at {price:.2}"
                    ));
                }
            }
        }

        self.commit(
            &item,
            ItemTransition {
                status: ItemStatus::Accepted,
                final_condition_media: Some(final_media),
                final_condition_sleeve: Some(final_sleeve),
                final_offer_price: Some(price),
            },
            NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::Accepted,
                admin_notes: join_notes(notes),
                adjusted_price: Some(price),
                seller_response: None,
            },
        )?;
        self.require_item(item_id)
    }

    /// Reject transition, allowed from `pending` and `counter_offered`.
    pub fn reject_item(&self, item_id: i64, admin_notes: Option<&str>) -> Result<SubmissionItem> {
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::Pending, ItemStatus::CounterOffered], "reject")?;
        self.commit(
            &item,
            ItemTransition::to_status(ItemStatus::Rejected),
            NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::Rejected,
                admin_notes: admin_notes.map(str::to_string),
                adjusted_price: None,
                seller_response: None,
            },
        )?;
        self.require_item(item_id)
    }

    /// Counter-offer transition, allowed only from `pending`. Notifies
    /// the seller after the transition committed; delivery problems are
    /// logged and swallowed.
    pub fn counter_offer_item(
        &self,
        item_id: i64,
        new_price: f64,
        admin_notes: Option<&str>,
    ) -> Result<SubmissionItem> {
        if new_price <= 0.0 {
            return Err(BrokerError::Validation(format!(
                "counter-offer price must be positive, got {new_price}"
            )));
        }
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::Pending], "counter-offer")?;

        self.commit(
            &item,
            ItemTransition {
                status: ItemStatus::CounterOffered,
                final_condition_media: None,
                final_condition_sleeve: None,
                final_offer_price: Some(new_price),
            },
            NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::CounterOffered,
                admin_notes: admin_notes.map(str::to_string),
                adjusted_price: Some(new_price),
                seller_response: Some(SellerResponse::Pending),
            },
        )?;
        self.dispatch_counter_offer_notice(&item, new_price);
        self.require_item(item_id)
    }

    /// Records the seller's answer to a counter-offer and moves the item
    /// to `accepted` or `rejected` accordingly.
    pub fn record_seller_response(
        &self,
        item_id: i64,
        response: SellerResponse,
    ) -> Result<SubmissionItem> {
        let new_status = match response {
            SellerResponse::Accepted => ItemStatus::Accepted,
            SellerResponse::Rejected => ItemStatus::Rejected,
            SellerResponse::Pending => {
                return Err(BrokerError::Validation(
                    "seller response must be accepted or rejected".to_string(),
                ))
            }
        };
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::CounterOffered], "record a seller response for")?;

        let applied = self.storage.apply_item_transition(
            item.id,
            item.status,
            &ItemTransition::to_status(new_status),
        )?;
        if !applied {
            return Err(status_conflict(&item));
        }
        // The counter-offer history row carries the response, no new row
        if !self.storage.resolve_pending_counter(item.id, response)? {
            log::warn!("Item {item_id} has no pending counter-offer history row to resolve");
        }
        log::info!("Seller {} item {}", response.as_str(), item_id);
        self.require_item(item_id)
    }

    /// Inspection after the physical records arrived. Records the
    /// confirmed grades and moves to `received_and_inspected`. The agreed
    /// price stays as it is, repricing is scoped to Accept.
    pub fn inspect_item(
        &self,
        item_id: i64,
        condition_media: &str,
        condition_sleeve: &str,
        admin_notes: Option<&str>,
    ) -> Result<SubmissionItem> {
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::Accepted], "inspect")?;

        let mut notes = vec![format!("Inspected as {condition_media}/{condition_sleeve}")];
        if let Some(admin_notes) = admin_notes {
            notes.push(admin_notes.to_string());
        }
        self.commit(
            &item,
            ItemTransition {
                status: ItemStatus::ReceivedAndInspected,
                final_condition_media: Some(condition_media.to_string()),
                final_condition_sleeve: Some(condition_sleeve.to_string()),
                final_offer_price: None,
            },
            NewHistoryEntry {
                submission_item_id: item.id,
                action_type: HistoryAction::Inspected,
                admin_notes: join_notes(notes),
                adjusted_price: None,
                seller_response: None,
            },
        )?;
        self.require_item(item_id)
    }

    /// Finalize transition: flips the status first, then asks the
    /// inventory collaborator for a lot. Keeping the guarded flip ahead
    /// of the lot call means a racing second Finalize loses the guard and
    /// the lot is created at most once. Returns the new lot number.
    pub fn finalize_item(&self, item_id: i64) -> Result<String> {
        let item = self.require_item(item_id)?;
        ensure_status(&item, &[ItemStatus::ReceivedAndInspected], "finalize")?;

        let applied = self.storage.apply_item_transition(
            item.id,
            item.status,
            &ItemTransition::to_status(ItemStatus::Finalized),
        )?;
        if !applied {
            return Err(status_conflict(&item));
        }

        let finalized = self.require_item(item_id)?;
        let lot_number = self.inventory.create_lot_from_item(&finalized)?;
        self.storage.append_history(&NewHistoryEntry {
            submission_item_id: item.id,
            action_type: HistoryAction::Finalized,
            admin_notes: Some(format!("Inventory lot {lot_number} created")),
            adjusted_price: None,
            seller_response: None,
        })?;
        log::info!("Item {} finalized into lot {}", item_id, lot_number);
        Ok(lot_number)
    }

    /// Accepts every actionable item of a submission, collecting per-item
    /// outcomes instead of failing the batch.
    pub fn bulk_accept(&self, submission_id: i64) -> Result<BulkOutcome> {
        self.require_submission(submission_id)?;
        let mut outcome = BulkOutcome::default();
        for item in self.storage.items_for_submission(submission_id)? {
            if !is_actionable(item.status) {
                outcome.skipped += 1;
                continue;
            }
            match self.accept_item(item.id, &AcceptRequest::default()) {
                Ok(_) => outcome.succeeded.push(item.id),
                Err(e) => {
                    log::warn!("Bulk accept: item {} failed: {}", item.id, e);
                    outcome.failed.push((item.id, e.to_string()));
                }
            }
        }
        log::info!(
            "Bulk accept on submission {}: {} accepted, {} failed, {} skipped",
            submission_id,
            outcome.succeeded.len(),
            outcome.failed.len(),
            outcome.skipped
        );
        Ok(outcome)
    }

    /// Rejects every actionable item of a submission.
    pub fn bulk_reject(&self, submission_id: i64, admin_notes: Option<&str>) -> Result<BulkOutcome> {
        self.require_submission(submission_id)?;
        let mut outcome = BulkOutcome::default();
        for item in self.storage.items_for_submission(submission_id)? {
            if !is_actionable(item.status) {
                outcome.skipped += 1;
                continue;
            }
            match self.reject_item(item.id, admin_notes) {
                Ok(_) => outcome.succeeded.push(item.id),
                Err(e) => {
                    log::warn!("Bulk reject: item {} failed: {}", item.id, e);
                    outcome.failed.push((item.id, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }

    // ── Internals ──

    fn require_item(&self, item_id: i64) -> Result<SubmissionItem> {
        self.storage
            .get_submission_item(item_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("submission item {item_id}")))
    }

    fn require_submission(&self, submission_id: i64) -> Result<Submission> {
        self.storage
            .get_submission(submission_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("submission {submission_id}")))
    }

    /// Guarded transition plus its history entry.
    fn commit(
        &self,
        item: &SubmissionItem,
        transition: ItemTransition,
        entry: NewHistoryEntry,
    ) -> Result<()> {
        let applied = self
            .storage
            .apply_item_transition(item.id, item.status, &transition)?;
        if !applied {
            return Err(status_conflict(item));
        }
        self.storage.append_history(&entry)?;
        Ok(())
    }

    fn dispatch_counter_offer_notice(&self, item: &SubmissionItem, new_price: f64) {
        let notice = match self.build_counter_offer_notice(item, new_price) {
            Ok(notice) => notice,
            Err(e) => {
                log::warn!(
                    "Could not assemble counter-offer notice for item {}: {}",
                    item.id,
                    e
                );
                return;
            }
        };
        if !self.notifier.send_counter_offer(&notice) {
            log::warn!("Counter-offer notice for item {} was not delivered", item.id);
        }
    }

    fn build_counter_offer_notice(
        &self,
        item: &SubmissionItem,
        new_price: f64,
    ) -> Result<CounterOfferNotice> {
        let submission = self.require_submission(item.submission_id)?;
        let release = self
            .storage
            .get_release(item.release_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("release {}", item.release_id)))?;
        Ok(CounterOfferNotice {
            seller_email: submission.seller_email,
            submission_number: submission.submission_number,
            title: release.title,
            artist: release.artist,
            quantity: item.quantity,
            new_price,
        })
    }
}

fn is_actionable(status: ItemStatus) -> bool {
    matches!(status, ItemStatus::Pending | ItemStatus::CounterOffered)
}

fn ensure_status(item: &SubmissionItem, allowed: &[ItemStatus], action: &str) -> Result<()> {
    if allowed.contains(&item.status) {
        return Ok(());
    }
    Err(BrokerError::Validation(format!(
        "cannot {} item {} in status '{}'",
        action,
        item.id,
        item.status.as_str()
    )))
}

fn status_conflict(item: &SubmissionItem) -> BrokerError {
    BrokerError::StatusConflict(format!(
        "item {} changed status concurrently, expected '{}'",
        item.id,
        item.status.as_str()
    ))
}

fn join_notes(notes: Vec<String>) -> Option<String> {
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::market::NoLiveData;
    use crate::models::{MarketSource, PolicyScope};
    use crate::storage::sqlite::SqliteStorage;
    use crate::storage::{
        make_test_policy, make_test_release, make_test_snapshot, make_test_tier, NewPolicyDiscount,
        NewSubmission,
    };

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<CounterOfferNotice>>,
        fail: bool,
    }

    impl CounterOfferNotifier for RecordingNotifier {
        fn send_counter_offer(&self, notice: &CounterOfferNotice) -> bool {
            self.sent.borrow_mut().push(notice.clone());
            !self.fail
        }
    }

    struct FailingInventory;

    impl InventoryWriter for FailingInventory {
        fn create_lot_from_item(&self, _item: &SubmissionItem) -> Result<String> {
            Err(BrokerError::Internal("warehouse unreachable".to_string()))
        }
    }

    struct Fixture {
        storage: SqliteStorage,
        submission_id: i64,
        release_id: i64,
    }

    /// Storage with tiers, a release, a 0.5/0.5 policy over a median-40
    /// snapshot and one open submission. Near Mint quotes at 22.00.
    fn fixture() -> Fixture {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .create_condition_tier(&make_test_tier("Near Mint", 2, 1.0))
            .unwrap();
        storage
            .create_condition_tier(&make_test_tier("Good", 5, 0.7))
            .unwrap();
        let mut policy = make_test_policy();
        policy.media_weight = 0.5;
        policy.sleeve_weight = 0.5;
        storage.create_policy(&policy).unwrap();
        let release = storage
            .create_release(&make_test_release("Animals", "Pink Floyd"))
            .unwrap();
        storage
            .upsert_snapshot(&make_test_snapshot(release.id, MarketSource::Discogs, 40.0))
            .unwrap();
        let submission = storage
            .create_submission(&NewSubmission {
                submission_number: "SUB-100".to_string(),
                seller_email: "seller@example.com".to_string(),
            })
            .unwrap();
        Fixture {
            storage,
            submission_id: submission.id,
            release_id: release.id,
        }
    }

    /// Runs `body` with a workflow wired to the fixture storage.
    fn with_workflow<T>(
        fixture: &Fixture,
        notifier: &RecordingNotifier,
        body: impl FnOnce(&SubmissionWorkflow) -> T,
    ) -> T {
        let engine = PricingEngine::new(&fixture.storage, &NoLiveData);
        let workflow =
            SubmissionWorkflow::new(&fixture.storage, &engine, notifier, &fixture.storage);
        body(&workflow)
    }

    fn submit_near_mint(fixture: &Fixture, notifier: &RecordingNotifier) -> SubmissionItem {
        with_workflow(fixture, notifier, |wf| {
            wf.submit_item(
                fixture.submission_id,
                fixture.release_id,
                1,
                "Near Mint",
                "Near Mint",
            )
        })
        .unwrap()
    }

    #[test]
    fn test_submit_quotes_and_records_history() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.auto_offer_price, 22.0);
        assert!(item.final_offer_price.is_none());

        let history = fixture.storage.history_for_item(item.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_type, HistoryAction::Submitted);
        assert_eq!(history[0].adjusted_price, Some(22.0));
    }

    #[test]
    fn test_submit_rejects_bad_quantity_and_unknown_release() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        with_workflow(&fixture, &notifier, |wf| {
            let err = wf
                .submit_item(fixture.submission_id, fixture.release_id, 0, "Near Mint", "Near Mint")
                .unwrap_err();
            assert!(matches!(err, BrokerError::Validation(_)));

            let err = wf
                .submit_item(fixture.submission_id, 9999, 1, "Near Mint", "Near Mint")
                .unwrap_err();
            assert!(matches!(err, BrokerError::NotFound(_)));
        });
    }

    #[test]
    fn test_accept_without_changes_locks_current_offer() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let accepted = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(item.id, &AcceptRequest::default())
        })
        .unwrap();

        assert_eq!(accepted.status, ItemStatus::Accepted);
        assert_eq!(accepted.final_offer_price, Some(22.0));
        assert_eq!(accepted.final_condition_media.as_deref(), Some("Near Mint"));
    }

    #[test]
    fn test_accept_recalculates_on_condition_change() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let accepted = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(
                item.id,
                &AcceptRequest {
                    final_condition_media: Some("Good".to_string()),
                    ..AcceptRequest::default()
                },
            )
        })
        .unwrap();

        // Media Good, sleeve Near Mint: 40 * 0.55 * 0.85 = 18.7 -> 18.75
        assert_eq!(accepted.status, ItemStatus::Accepted);
        assert_eq!(accepted.final_offer_price, Some(18.75));
        assert_ne!(accepted.final_offer_price, Some(item.auto_offer_price));

        let history = fixture.storage.history_for_item(item.id).unwrap();
        let note = history[1].admin_notes.as_deref().unwrap();
        assert!(note.contains("recalculated from 22.00 to 18.75"), "note: {note}");
    }

    #[test]
    fn test_accept_override_price_skips_recalculation() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let accepted = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(
                item.id,
                &AcceptRequest {
                    final_condition_media: Some("Good".to_string()),
                    override_price: Some(15.0),
                    admin_notes: Some("haggled on the phone".to_string()),
                    ..AcceptRequest::default()
                },
            )
        })
        .unwrap();

        assert_eq!(accepted.final_offer_price, Some(15.0));
        let history = fixture.storage.history_for_item(item.id).unwrap();
        let note = history[1].admin_notes.as_deref().unwrap();
        assert!(note.contains("haggled"));
        assert!(!note.contains("recalculated"));
    }

    #[test]
    fn test_accept_survives_recalculation_failure() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        // Retire every policy so the re-quote cannot resolve one
        let mut retired = make_test_policy();
        retired.is_active = false;
        let governing = fixture
            .storage
            .find_active_policy(PolicyScope::Global, None)
            .unwrap()
            .unwrap();
        fixture.storage.update_policy(governing.id, &retired).unwrap();

        let accepted = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(
                item.id,
                &AcceptRequest {
                    final_condition_media: Some("Good".to_string()),
                    ..AcceptRequest::default()
                },
            )
        })
        .unwrap();

        // Offer kept, transition still happened
        assert_eq!(accepted.status, ItemStatus::Accepted);
        assert_eq!(accepted.final_offer_price, Some(22.0));
        let history = fixture.storage.history_for_item(item.id).unwrap();
        let note = history[1].admin_notes.as_deref().unwrap();
        assert!(note.contains("recalculation failed"));
    }

    #[test]
    fn test_counter_offer_validates_price_before_any_state_change() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let err = with_workflow(&fixture, &notifier, |wf| {
            wf.counter_offer_item(item.id, 0.0, None)
        })
        .unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));

        let unchanged = fixture
            .storage
            .get_submission_item(item.id)
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.status, ItemStatus::Pending);
        assert_eq!(fixture.storage.history_for_item(item.id).unwrap().len(), 1);
        assert!(notifier.sent.borrow().is_empty());
    }

    #[test]
    fn test_counter_offer_notifies_and_records_pending_response() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let countered = with_workflow(&fixture, &notifier, |wf| {
            wf.counter_offer_item(item.id, 18.0, Some("sleeve wear"))
        })
        .unwrap();

        assert_eq!(countered.status, ItemStatus::CounterOffered);
        assert_eq!(countered.final_offer_price, Some(18.0));

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].seller_email, "seller@example.com");
        assert_eq!(sent[0].submission_number, "SUB-100");
        assert_eq!(sent[0].new_price, 18.0);

        let history = fixture.storage.history_for_item(item.id).unwrap();
        assert_eq!(history[1].action_type, HistoryAction::CounterOffered);
        assert_eq!(history[1].seller_response, Some(SellerResponse::Pending));
    }

    #[test]
    fn test_failed_notification_does_not_fail_transition() {
        let fixture = fixture();
        let notifier = RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        };
        let item = submit_near_mint(&fixture, &notifier);

        let countered = with_workflow(&fixture, &notifier, |wf| {
            wf.counter_offer_item(item.id, 18.0, None)
        })
        .unwrap();
        assert_eq!(countered.status, ItemStatus::CounterOffered);
        assert_eq!(notifier.sent.borrow().len(), 1);
    }

    #[test]
    fn test_seller_response_resolves_counter() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        with_workflow(&fixture, &notifier, |wf| {
            wf.counter_offer_item(item.id, 18.0, None).unwrap();
            let updated = wf
                .record_seller_response(item.id, SellerResponse::Accepted)
                .unwrap();
            assert_eq!(updated.status, ItemStatus::Accepted);
            assert_eq!(updated.final_offer_price, Some(18.0));
        });

        let history = fixture.storage.history_for_item(item.id).unwrap();
        // No extra row, the counter-offer entry carries the resolution
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].seller_response, Some(SellerResponse::Accepted));
    }

    #[test]
    fn test_seller_response_validation() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        with_workflow(&fixture, &notifier, |wf| {
            // Pending is not an answer
            let err = wf
                .record_seller_response(item.id, SellerResponse::Pending)
                .unwrap_err();
            assert!(matches!(err, BrokerError::Validation(_)));

            // And the item is not counter_offered yet
            let err = wf
                .record_seller_response(item.id, SellerResponse::Accepted)
                .unwrap_err();
            assert!(matches!(err, BrokerError::Validation(_)));
        });
    }

    #[test]
    fn test_inspect_keeps_price() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let inspected = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(item.id, &AcceptRequest::default()).unwrap();
            wf.inspect_item(item.id, "Good", "Good", Some("ring wear"))
        })
        .unwrap();

        assert_eq!(inspected.status, ItemStatus::ReceivedAndInspected);
        assert_eq!(inspected.final_condition_media.as_deref(), Some("Good"));
        // Worse grade found at inspection still keeps the accepted price
        assert_eq!(inspected.final_offer_price, Some(22.0));
    }

    #[test]
    fn test_finalize_creates_lot_and_history() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let lot_number = with_workflow(&fixture, &notifier, |wf| {
            wf.accept_item(item.id, &AcceptRequest::default()).unwrap();
            wf.inspect_item(item.id, "Near Mint", "Near Mint", None).unwrap();
            wf.finalize_item(item.id)
        })
        .unwrap();

        assert_eq!(lot_number, "LOT-000001");
        let lot = fixture.storage.get_lot(&lot_number).unwrap().unwrap();
        assert_eq!(lot.acquisition_price, 22.0);
        assert_eq!(lot.source_item_id, item.id);

        let finalized = fixture
            .storage
            .get_submission_item(item.id)
            .unwrap()
            .unwrap();
        assert_eq!(finalized.status, ItemStatus::Finalized);

        let history = fixture.storage.history_for_item(item.id).unwrap();
        assert_eq!(history.last().unwrap().action_type, HistoryAction::Finalized);
        assert!(history
            .last()
            .unwrap()
            .admin_notes
            .as_deref()
            .unwrap()
            .contains("LOT-000001"));
    }

    #[test]
    fn test_finalize_propagates_inventory_failure_after_flip() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let engine = PricingEngine::new(&fixture.storage, &NoLiveData);
        let workflow =
            SubmissionWorkflow::new(&fixture.storage, &engine, &notifier, &FailingInventory);
        workflow.accept_item(item.id, &AcceptRequest::default()).unwrap();
        workflow
            .inspect_item(item.id, "Near Mint", "Near Mint", None)
            .unwrap();

        let err = workflow.finalize_item(item.id).unwrap_err();
        assert!(matches!(err, BrokerError::Internal(_)));

        // The guard flipped before the lot call, a retry cannot double-create
        let stuck = fixture
            .storage
            .get_submission_item(item.id)
            .unwrap()
            .unwrap();
        assert_eq!(stuck.status, ItemStatus::Finalized);
        let err = workflow.finalize_item(item.id).unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[test]
    fn test_invalid_transitions_name_current_status() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        with_workflow(&fixture, &notifier, |wf| {
            wf.reject_item(item.id, None).unwrap();

            let err = wf.accept_item(item.id, &AcceptRequest::default()).unwrap_err();
            assert!(err.to_string().contains("'rejected'"), "got: {err}");

            let err = wf.finalize_item(item.id).unwrap_err();
            assert!(matches!(err, BrokerError::Validation(_)));

            let err = wf.counter_offer_item(item.id, 10.0, None).unwrap_err();
            assert!(matches!(err, BrokerError::Validation(_)));
        });
    }

    #[test]
    fn test_bulk_accept_collects_outcomes() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let first = submit_near_mint(&fixture, &notifier);
        let second = submit_near_mint(&fixture, &notifier);
        let third = submit_near_mint(&fixture, &notifier);

        with_workflow(&fixture, &notifier, |wf| {
            // One item is already out of reach for bulk accept
            wf.reject_item(third.id, None).unwrap();

            let outcome = wf.bulk_accept(fixture.submission_id).unwrap();
            assert_eq!(outcome.succeeded, vec![first.id, second.id]);
            assert!(outcome.failed.is_empty());
            assert_eq!(outcome.skipped, 1);
        });

        let items = fixture
            .storage
            .items_for_submission(fixture.submission_id)
            .unwrap();
        assert_eq!(items[0].status, ItemStatus::Accepted);
        assert_eq!(items[1].status, ItemStatus::Accepted);
        assert_eq!(items[2].status, ItemStatus::Rejected);
    }

    #[test]
    fn test_bulk_reject_on_unknown_submission() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let err = with_workflow(&fixture, &notifier, |wf| wf.bulk_reject(999, None)).unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[test]
    fn test_counter_offered_item_can_be_accepted_by_admin() {
        let fixture = fixture();
        let notifier = RecordingNotifier::default();
        let item = submit_near_mint(&fixture, &notifier);

        let accepted = with_workflow(&fixture, &notifier, |wf| {
            wf.counter_offer_item(item.id, 18.0, None).unwrap();
            wf.accept_item(item.id, &AcceptRequest::default())
        })
        .unwrap();

        // Accept from counter_offered keeps the countered price
        assert_eq!(accepted.status, ItemStatus::Accepted);
        assert_eq!(accepted.final_offer_price, Some(18.0));
    }
}
