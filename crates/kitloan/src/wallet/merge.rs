//! Merge engine
//!
//! Applies push events to the account view with id-based dedup and a stable
//! newest-first order. Application is commutative on identity with respect
//! to arrival order (a pull and a push carrying the same id never produce
//! two entries) and idempotent (applying the same event twice equals
//! applying it once).

use kitloan_common::account::{AccountView, LiveRecord};
use kitloan_common::events::{LiveEvent, LivePayload};

/// What applying an event did to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The event changed the view
    Applied,
    /// The event's id was already present in an append-only collection
    Duplicate,
    /// The balance was set from the push; a reconciling pull must follow to
    /// pick up composite updates the payload did not include
    NeedsReconcile,
}

/// Applies remote events to the local collections
#[derive(Debug)]
pub struct MergeEngine;

impl MergeEngine {
    /// Apply one push event to the view
    pub fn apply(view: &mut AccountView, event: &LiveEvent) -> MergeOutcome {
        match &event.payload {
            LivePayload::Notification(record) => apply_insert(&mut view.notifications, record),
            LivePayload::Transaction(record) => apply_insert(&mut view.wallet.transactions, record),
            LivePayload::Balance(update) => {
                view.wallet.balance = update.balance;
                MergeOutcome::NeedsReconcile
            }
            LivePayload::BorrowRequest(record) => {
                upsert(&mut view.borrow_requests, record);
                MergeOutcome::Applied
            }
            LivePayload::Penalty(record) => {
                upsert(&mut view.penalties, record);
                MergeOutcome::Applied
            }
            LivePayload::GroupMember(record) => {
                upsert(&mut view.group_members, record);
                MergeOutcome::Applied
            }
        }
    }
}

fn apply_insert<T: LiveRecord + Clone>(items: &mut Vec<T>, record: &T) -> MergeOutcome {
    if insert_unique(items, record) {
        MergeOutcome::Applied
    } else {
        MergeOutcome::Duplicate
    }
}

/// Insert into an append-only collection, preserving newest-first order
///
/// A record whose id is already present is dropped; this guards against a
/// push arriving for something a pull already captured. The insertion point
/// is not necessarily index 0, since the pull path may have inserted rows
/// with timestamps between the client's wall-clock ordering.
pub fn insert_unique<T: LiveRecord + Clone>(items: &mut Vec<T>, record: &T) -> bool {
    if items.iter().any(|existing| existing.id() == record.id()) {
        return false;
    }

    let at = insert_position(items, record.created_at());
    items.insert(at, record.clone());
    true
}

/// Upsert into a collection, preserving newest-first order
///
/// An existing entry with the same id is replaced in place, keeping its
/// position; a new entry is inserted where its creation time belongs.
pub fn upsert<T: LiveRecord + Clone>(items: &mut Vec<T>, record: &T) {
    if let Some(existing) = items.iter_mut().find(|existing| existing.id() == record.id()) {
        *existing = record.clone();
        return;
    }

    let at = insert_position(items, record.created_at());
    items.insert(at, record.clone());
}

/// Sort a pulled collection newest-first before it replaces the local one
pub fn sort_newest_first<T: LiveRecord>(items: &mut [T]) {
    items.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}

fn insert_position<T: LiveRecord>(items: &[T], created_at: u64) -> usize {
    items
        .iter()
        .position(|existing| existing.created_at() < created_at)
        .unwrap_or(items.len())
}

#[cfg(test)]
mod tests {
    use kitloan_common::account::{
        BalanceUpdate, BorrowRequestRecord, BorrowRequestStatus, NotificationKind,
        NotificationRecord,
    };
    use kitloan_common::events::LiveTopic;
    use kitloan_common::Amount;

    use super::*;

    fn notification(id: &str, created_at: u64) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            kind: NotificationKind::Payment,
            sub_type: None,
            title: "t".to_string(),
            message: "m".to_string(),
            is_read: false,
            created_at,
        }
    }

    fn notification_event(id: &str, created_at: u64) -> LiveEvent {
        LiveEvent {
            topic: LiveTopic::Notifications("u-1".to_string()),
            payload: LivePayload::Notification(notification(id, created_at)),
        }
    }

    fn request(id: &str, status: BorrowRequestStatus, created_at: u64) -> BorrowRequestRecord {
        BorrowRequestRecord {
            id: id.to_string(),
            kit_id: "kit-1".to_string(),
            kit_name: None,
            status,
            created_at,
        }
    }

    fn ids(view: &AccountView) -> Vec<&str> {
        view.notifications.iter().map(|n| n.id()).collect()
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut view = AccountView::default();
        let event = notification_event("N1", 10);

        assert_eq!(MergeEngine::apply(&mut view, &event), MergeOutcome::Applied);
        let after_once = view.clone();

        assert_eq!(
            MergeEngine::apply(&mut view, &event),
            MergeOutcome::Duplicate
        );
        assert_eq!(view, after_once);
    }

    #[test]
    fn test_pull_then_push_same_id_keeps_one_entry() {
        let mut view = AccountView::default();
        // the pull inserted N1 moments earlier
        view.notifications = vec![notification("N1", 10)];

        let event = notification_event("N1", 10);
        assert_eq!(
            MergeEngine::apply(&mut view, &event),
            MergeOutcome::Duplicate
        );
        assert_eq!(view.notifications.len(), 1);
    }

    #[test]
    fn test_insert_keeps_newest_first_order() {
        let mut view = AccountView::default();
        view.notifications = vec![notification("N3", 30), notification("N1", 10)];

        // a push with a timestamp between the pulled rows lands between them
        MergeEngine::apply(&mut view, &notification_event("N2", 20));
        assert_eq!(ids(&view), vec!["N3", "N2", "N1"]);

        // newer than everything lands at the front, older at the back
        MergeEngine::apply(&mut view, &notification_event("N4", 40));
        MergeEngine::apply(&mut view, &notification_event("N0", 5));
        assert_eq!(ids(&view), vec!["N4", "N3", "N2", "N1", "N0"]);

        let mut timestamps: Vec<u64> = view.notifications.iter().map(|n| n.created_at).collect();
        let sorted = {
            timestamps.sort_by(|a, b| b.cmp(a));
            timestamps
        };
        assert_eq!(
            sorted,
            view.notifications
                .iter()
                .map(|n| n.created_at)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut view = AccountView::default();
        view.borrow_requests = vec![
            request("R2", BorrowRequestStatus::Pending, 20),
            request("R1", BorrowRequestStatus::Pending, 10),
        ];

        let event = LiveEvent {
            topic: LiveTopic::BorrowRequests("u-1".to_string()),
            payload: LivePayload::BorrowRequest(request("R1", BorrowRequestStatus::Approved, 10)),
        };
        assert_eq!(MergeEngine::apply(&mut view, &event), MergeOutcome::Applied);

        // position preserved, content replaced
        assert_eq!(view.borrow_requests[1].id, "R1");
        assert_eq!(view.borrow_requests[1].status, BorrowRequestStatus::Approved);
        assert_eq!(view.borrow_requests.len(), 2);
    }

    #[test]
    fn test_balance_push_sets_and_requests_reconcile() {
        let mut view = AccountView::default();
        let event = LiveEvent {
            topic: LiveTopic::WalletBalance("u-1".to_string()),
            payload: LivePayload::Balance(BalanceUpdate {
                balance: Amount::new(100_000),
            }),
        };

        assert_eq!(
            MergeEngine::apply(&mut view, &event),
            MergeOutcome::NeedsReconcile
        );
        assert_eq!(view.wallet.balance, Amount::new(100_000));
    }
}
