//! What a finished save means for the caller and for each item in it.

use std::collections::HashSet;

use uuid::Uuid;

use crate::persistence::types::SaveOutcomeSummary;

/// Caller-facing verdict on a save, derived only from the aggregate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveClassification {
    AllSucceeded,
    PartialSuccess { failed: u32 },
    AllFailed,
    /// The batch carried no media (form metadata only).
    NothingAttempted,
}

pub fn classify(summary: &SaveOutcomeSummary) -> SaveClassification {
    let attempted = summary.attempted();
    let uploaded = summary.uploaded();
    let failed = summary.failed();
    if attempted == 0 {
        SaveClassification::NothingAttempted
    } else if uploaded == 0 {
        SaveClassification::AllFailed
    } else if failed == 0 {
        SaveClassification::AllSucceeded
    } else {
        SaveClassification::PartialSuccess { failed }
    }
}

impl SaveClassification {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SaveClassification::AllSucceeded | SaveClassification::NothingAttempted
        )
    }
}

/// One item of a category as it went out in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub local_id: Uuid,
    /// Above the configured size ceiling for its category.
    pub oversized: bool,
}

/// Splits one category's attempts into (saved, reverted), both in batch order.
///
/// The backend only reports how many items of a category it stored, so the
/// first `uploaded` attempts are taken as stored, in this order: items the
/// backend returned a record for by `client_ref`, items within the size
/// ceiling in batch order, then oversized items. Echoed items always count as
/// stored even if the summary under-reports.
///
/// Records without a `client_ref` prove nothing about which item they belong
/// to, so they must not be passed in `echoed`; pair them afterwards with the
/// items this function attributes as stored.
pub fn attribute_uploads(
    attempts: &[Attempt],
    echoed: &HashSet<Uuid>,
    uploaded: u32,
) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut ranked: Vec<&Attempt> = attempts.iter().collect();
    // Stable sort keeps batch order within each rank.
    ranked.sort_by_key(|a| {
        if echoed.contains(&a.local_id) {
            0
        } else if !a.oversized {
            1
        } else {
            2
        }
    });

    let echoed_count = attempts
        .iter()
        .filter(|a| echoed.contains(&a.local_id))
        .count();
    let stored = (uploaded as usize).max(echoed_count).min(attempts.len());
    let stored: HashSet<Uuid> = ranked[..stored].iter().map(|a| a.local_id).collect();

    attempts
        .iter()
        .map(|a| a.local_id)
        .partition(|id| stored.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(ru: u32, ra: u32, su: u32, sa: u32) -> SaveOutcomeSummary {
        SaveOutcomeSummary {
            recordings_uploaded: ru,
            recordings_attempted: ra,
            screenshots_uploaded: su,
            screenshots_attempted: sa,
        }
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify(&summary(1, 1, 2, 2)), SaveClassification::AllSucceeded);
        assert_eq!(
            classify(&summary(1, 2, 0, 0)),
            SaveClassification::PartialSuccess { failed: 1 }
        );
        assert_eq!(
            classify(&summary(0, 1, 1, 3)),
            SaveClassification::PartialSuccess { failed: 3 }
        );
        assert_eq!(classify(&summary(0, 2, 0, 1)), SaveClassification::AllFailed);
        assert_eq!(classify(&summary(0, 0, 0, 0)), SaveClassification::NothingAttempted);
        assert!(classify(&summary(0, 0, 0, 0)).is_success());
        assert!(!classify(&summary(0, 1, 0, 0)).is_success());
    }

    #[test]
    fn oversized_items_are_blamed_first() {
        let small = Attempt { local_id: Uuid::new_v4(), oversized: false };
        let big = Attempt { local_id: Uuid::new_v4(), oversized: true };

        let (saved, reverted) = attribute_uploads(&[big, small], &HashSet::new(), 1);
        assert_eq!(saved, vec![small.local_id]);
        assert_eq!(reverted, vec![big.local_id]);
    }

    #[test]
    fn stored_items_keep_batch_order() {
        let big = Attempt { local_id: Uuid::new_v4(), oversized: true };
        let first = Attempt { local_id: Uuid::new_v4(), oversized: false };
        let second = Attempt { local_id: Uuid::new_v4(), oversized: false };

        let (saved, reverted) = attribute_uploads(&[first, big, second], &HashSet::new(), 3);
        assert_eq!(saved, vec![first.local_id, big.local_id, second.local_id]);
        assert!(reverted.is_empty());
    }

    #[test]
    fn echoed_items_rank_first() {
        let a = Attempt { local_id: Uuid::new_v4(), oversized: false };
        let b = Attempt { local_id: Uuid::new_v4(), oversized: false };
        let echoed: HashSet<Uuid> = [b.local_id].into_iter().collect();

        let (saved, reverted) = attribute_uploads(&[a, b], &echoed, 1);
        assert_eq!(saved, vec![b.local_id]);
        assert_eq!(reverted, vec![a.local_id]);

        // Summary claiming zero uploads cannot un-store an echoed record.
        let (saved, _) = attribute_uploads(&[a, b], &echoed, 0);
        assert_eq!(saved, vec![b.local_id]);
    }

    #[test]
    fn over_reported_uploads_are_clamped() {
        let a = Attempt { local_id: Uuid::new_v4(), oversized: false };
        let (saved, reverted) = attribute_uploads(&[a], &HashSet::new(), 5);
        assert_eq!(saved, vec![a.local_id]);
        assert!(reverted.is_empty());
        assert_eq!(attribute_uploads(&[], &HashSet::new(), 3), (vec![], vec![]));
    }
}
