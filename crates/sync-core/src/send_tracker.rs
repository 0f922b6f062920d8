//! Optimistic send bookkeeping.
//!
//! Every transition is idempotent: acknowledgements and delivery
//! confirmations may arrive before, after or interleaved with the poll that
//! already contains the sent item, and a late event for a record that is gone
//! is a no-op.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use crate::types::{ConversationId, ItemId, LocalId, OutgoingPayload, PendingSend, SendStatus};

/// Upper bound on remembered confirmations that arrived before their ack.
const EARLY_CONFIRMATION_CAP: usize = 256;

/// Result of feeding a delivery confirmation into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A tracked `Sent` record advanced to `Delivered`.
    Advanced(LocalId),
    /// No record carries this remote id yet; remembered for a later ack.
    Deferred,
    /// The record was already delivered or retired.
    Ignored,
}

#[derive(Debug, Default)]
pub struct SendTracker {
    next_local: u64,
    records: Vec<PendingSend>,
    early_confirmations: VecDeque<ItemId>,
}

impl SendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outgoing message and return its overlay entry.
    pub fn submit(&mut self, conversation: ConversationId, payload: OutgoingPayload) -> PendingSend {
        self.next_local += 1;
        let record = PendingSend {
            local_id: LocalId(self.next_local),
            conversation,
            remote_id: None,
            status: SendStatus::Sending,
            payload,
        };
        debug!(local_id = %record.local_id, %conversation, "optimistic send submitted");
        self.records.push(record.clone());
        record
    }

    /// Record the backend-assigned id for a send. Returns whether a record
    /// changed.
    pub fn on_submit_accepted(&mut self, local_id: LocalId, remote_id: ItemId) -> bool {
        let early = self.take_early_confirmation(remote_id);
        let Some(record) = self.records.iter_mut().find(|r| r.local_id == local_id) else {
            trace!(%local_id, %remote_id, "ack for unknown send ignored");
            return false;
        };
        if record.status != SendStatus::Sending {
            return false;
        }
        record.remote_id = Some(remote_id);
        record.status = if early {
            SendStatus::Delivered
        } else {
            SendStatus::Sent
        };
        debug!(%local_id, %remote_id, status = ?record.status, "send accepted");
        true
    }

    /// Advance the record carrying `remote_id` to `Delivered`.
    pub fn on_delivery_confirmed(&mut self, remote_id: ItemId) -> DeliveryOutcome {
        let Some(index) = self
            .records
            .iter()
            .position(|r| r.remote_id == Some(remote_id))
        else {
            if self.any_sending() {
                self.remember_early_confirmation(remote_id);
                return DeliveryOutcome::Deferred;
            }
            return DeliveryOutcome::Ignored;
        };

        let record = &mut self.records[index];
        if record.status != SendStatus::Sent {
            return DeliveryOutcome::Ignored;
        }
        record.status = SendStatus::Delivered;
        debug!(local_id = %record.local_id, %remote_id, "send delivered");
        DeliveryOutcome::Advanced(record.local_id)
    }

    /// Drop a failed send. The removed record is returned so the caller can
    /// restore the input text and drop the optimistic row.
    pub fn on_submit_failed(&mut self, local_id: LocalId) -> Option<PendingSend> {
        let index = self.records.iter().position(|r| r.local_id == local_id)?;
        let record = self.records.remove(index);
        debug!(%local_id, "optimistic send rolled back");
        Some(record)
    }

    /// Overlay entries for one conversation in submission order.
    ///
    /// Sent and delivered records stay in the overlay until a message pass
    /// sees their remote id (see [`SendTracker::retire_reconciled`]).
    pub fn overlay(&self, conversation: ConversationId) -> Vec<PendingSend> {
        self.records
            .iter()
            .filter(|r| r.conversation == conversation)
            .cloned()
            .collect()
    }

    /// Remove records whose remote id appeared in a snapshot. Until then the
    /// record keeps its optimistic row, whatever its status.
    pub fn retire_reconciled(
        &mut self,
        conversation: ConversationId,
        snapshot_ids: &HashSet<ItemId>,
    ) -> usize {
        let before = self.records.len();
        self.records.retain(|r| {
            if r.conversation != conversation {
                return true;
            }
            !r.remote_id.is_some_and(|id| snapshot_ids.contains(&id))
        });
        let retired = before - self.records.len();
        if retired > 0 {
            trace!(%conversation, retired, "retired reconciled sends");
        }
        retired
    }

    /// Whether a send call for `conversation` has not returned yet.
    pub fn has_outstanding(&self, conversation: ConversationId) -> bool {
        self.records
            .iter()
            .any(|r| r.conversation == conversation && r.status == SendStatus::Sending)
    }

    pub fn get(&self, local_id: LocalId) -> Option<&PendingSend> {
        self.records.iter().find(|r| r.local_id == local_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn any_sending(&self) -> bool {
        self.records.iter().any(|r| r.status == SendStatus::Sending)
    }

    fn remember_early_confirmation(&mut self, remote_id: ItemId) {
        if self.early_confirmations.contains(&remote_id) {
            return;
        }
        if self.early_confirmations.len() == EARLY_CONFIRMATION_CAP {
            self.early_confirmations.pop_front();
        }
        self.early_confirmations.push_back(remote_id);
    }

    fn take_early_confirmation(&mut self, remote_id: ItemId) -> bool {
        match self.early_confirmations.iter().position(|id| *id == remote_id) {
            Some(index) => {
                self.early_confirmations.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: ConversationId = ConversationId(1);

    fn ids(values: &[i64]) -> HashSet<ItemId> {
        values.iter().copied().map(ItemId).collect()
    }

    #[test]
    fn submit_assigns_monotonic_local_ids_in_sending_state() {
        let mut tracker = SendTracker::new();
        let a = tracker.submit(CONV, OutgoingPayload::text("a"));
        let b = tracker.submit(CONV, OutgoingPayload::text("b"));

        assert_eq!(a.local_id, LocalId(1));
        assert_eq!(b.local_id, LocalId(2));
        assert_eq!(a.status, SendStatus::Sending);
        assert!(a.remote_id.is_none());
        assert!(tracker.has_outstanding(CONV));
        assert_eq!(tracker.overlay(CONV).len(), 2);
    }

    #[test]
    fn happy_path_advances_through_sent_and_delivered() {
        let mut tracker = SendTracker::new();
        let sent = tracker.submit(CONV, OutgoingPayload::text("hi"));

        assert!(tracker.on_submit_accepted(sent.local_id, ItemId(10)));
        assert!(!tracker.has_outstanding(CONV));
        assert_eq!(tracker.overlay(CONV)[0].status, SendStatus::Sent);

        assert_eq!(
            tracker.on_delivery_confirmed(ItemId(10)),
            DeliveryOutcome::Advanced(sent.local_id)
        );
        assert_eq!(tracker.overlay(CONV)[0].status, SendStatus::Delivered);

        assert_eq!(tracker.retire_reconciled(CONV, &ids(&[10])), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn delivered_record_survives_snapshot_without_its_item() {
        let mut tracker = SendTracker::new();
        let sent = tracker.submit(CONV, OutgoingPayload::text("hi"));
        tracker.on_submit_accepted(sent.local_id, ItemId(20));
        tracker.on_delivery_confirmed(ItemId(20));

        assert_eq!(tracker.retire_reconciled(CONV, &ids(&[10])), 0);
        assert_eq!(tracker.overlay(CONV).len(), 1);

        assert_eq!(tracker.retire_reconciled(CONV, &ids(&[10, 20])), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn repeated_and_late_events_are_no_ops() {
        let mut tracker = SendTracker::new();
        let sent = tracker.submit(CONV, OutgoingPayload::text("hi"));
        tracker.on_submit_accepted(sent.local_id, ItemId(10));

        assert!(!tracker.on_submit_accepted(sent.local_id, ItemId(10)));
        tracker.on_delivery_confirmed(ItemId(10));
        assert_eq!(tracker.on_delivery_confirmed(ItemId(10)), DeliveryOutcome::Ignored);

        tracker.retire_reconciled(CONV, &ids(&[10]));
        assert_eq!(tracker.on_delivery_confirmed(ItemId(10)), DeliveryOutcome::Ignored);
        assert!(!tracker.on_submit_accepted(sent.local_id, ItemId(10)));
        assert!(tracker.on_submit_failed(sent.local_id).is_none());
    }

    #[test]
    fn confirmation_before_ack_is_applied_when_ack_lands() {
        let mut tracker = SendTracker::new();
        let sent = tracker.submit(CONV, OutgoingPayload::text("hi"));

        assert_eq!(tracker.on_delivery_confirmed(ItemId(10)), DeliveryOutcome::Deferred);
        assert!(tracker.on_submit_accepted(sent.local_id, ItemId(10)));

        assert_eq!(
            tracker.get(sent.local_id).map(|r| r.status),
            Some(SendStatus::Delivered)
        );
    }

    #[test]
    fn snapshot_containing_remote_id_retires_sent_record() {
        let mut tracker = SendTracker::new();
        let first = tracker.submit(CONV, OutgoingPayload::text("one"));
        let _second = tracker.submit(CONV, OutgoingPayload::text("two"));
        tracker.on_submit_accepted(first.local_id, ItemId(10));

        assert_eq!(tracker.retire_reconciled(CONV, &ids(&[10])), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.has_outstanding(CONV));
    }

    #[test]
    fn failure_removes_record_and_returns_payload() {
        let mut tracker = SendTracker::new();
        let sent = tracker.submit(CONV, OutgoingPayload::text("draft"));

        let rolled_back = tracker
            .on_submit_failed(sent.local_id)
            .expect("record should be removed");
        assert_eq!(rolled_back.payload.text, "draft");
        assert!(tracker.overlay(CONV).is_empty());
        assert!(!tracker.has_outstanding(CONV));
    }

    #[test]
    fn overlay_is_scoped_to_conversation() {
        let mut tracker = SendTracker::new();
        tracker.submit(CONV, OutgoingPayload::text("here"));
        tracker.submit(ConversationId(2), OutgoingPayload::text("there"));

        assert_eq!(tracker.overlay(CONV).len(), 1);
        assert!(!tracker.has_outstanding(ConversationId(3)));
        assert_eq!(tracker.retire_reconciled(ConversationId(3), &ids(&[1])), 0);
    }
}
