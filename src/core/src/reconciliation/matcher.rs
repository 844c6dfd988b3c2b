//! Maps freshly persisted backend records back onto local items.
//!
//! Records that echo a `client_ref` naming one of the local items are matched
//! exactly. Everything else falls back to the temporal heuristic: records whose
//! timestamp lies within the trailing window of `now` are paired with the
//! still-unmatched local items positionally, in the order both were sent and
//! returned. Two saves landing inside the same window can therefore be
//! misassigned when the backend does not echo `client_ref`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use uuid::Uuid;

use super::types::{Assignment, MatchKind};
use crate::persistence::types::{BackendId, PersistedRecord};

pub const DEFAULT_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct ReconciliationMatcher {
    window: Duration,
}

impl Default for ReconciliationMatcher {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_WINDOW_SECS))
    }
}

impl ReconciliationMatcher {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Only the lower bound is checked; records stamped slightly in the future
    /// (backend clock ahead of ours) still count as fresh.
    fn is_fresh(&self, record: &PersistedRecord, now: DateTime<Utc>) -> bool {
        record.timestamp >= now - self.window
    }

    /// Produces at most one assignment per local item and uses each record at most once.
    ///
    /// `local_ids` must be in batch order. Records with an id that fails
    /// [`BackendId::parse`] are consumed without producing an assignment.
    pub fn match_items(
        &self,
        local_ids: &[Uuid],
        records: &[PersistedRecord],
        now: DateTime<Utc>,
    ) -> Vec<Assignment> {
        let mut assignments = self.match_exact(local_ids, records);
        let assigned: HashSet<Uuid> = assignments.iter().map(|a| a.local_id).collect();
        let waiting: Vec<Uuid> = local_ids
            .iter()
            .filter(|id| !assigned.contains(*id))
            .copied()
            .collect();
        assignments.extend(self.match_windowed(&waiting, records, now));
        assignments
    }

    /// Matches records that echo the `client_ref` of one of `local_ids`.
    pub fn match_exact(&self, local_ids: &[Uuid], records: &[PersistedRecord]) -> Vec<Assignment> {
        let local_set: HashSet<Uuid> = local_ids.iter().copied().collect();
        let mut assigned: HashSet<Uuid> = HashSet::new();
        let mut assignments = Vec::new();

        for record in records {
            let Some(client_ref) = record.client_ref else {
                continue;
            };
            if !local_set.contains(&client_ref) {
                continue;
            }
            if !assigned.insert(client_ref) {
                warn!("[{}] duplicate backend record {} ignored", client_ref, record.id);
                continue;
            }
            match BackendId::parse(&record.id) {
                Ok(backend_id) => {
                    debug!("[{}] matched {} by client_ref", client_ref, backend_id);
                    assignments.push(Assignment {
                        local_id: client_ref,
                        backend_id,
                        kind: MatchKind::Exact,
                    });
                }
                Err(e) => warn!("[{}] backend returned unusable id: {}", client_ref, e),
            }
        }

        assignments
    }

    /// Pairs `local_ids` positionally with the fresh records that carry no
    /// `client_ref`. Records naming any `client_ref` belong to the exact pass,
    /// or to some other save, and are never reused here.
    pub fn match_windowed(
        &self,
        local_ids: &[Uuid],
        records: &[PersistedRecord],
        now: DateTime<Utc>,
    ) -> Vec<Assignment> {
        let fresh = records
            .iter()
            .filter(|record| record.client_ref.is_none() && self.is_fresh(record, now));

        let mut assignments = Vec::new();
        for (local_id, record) in local_ids.iter().zip(fresh) {
            match BackendId::parse(&record.id) {
                Ok(backend_id) => {
                    debug!(
                        "[{}] matched {} by time window ({})",
                        local_id, backend_id, record.timestamp
                    );
                    assignments.push(Assignment {
                        local_id: *local_id,
                        backend_id,
                        kind: MatchKind::Windowed,
                    });
                }
                Err(e) => warn!("[{}] backend returned unusable id: {}", local_id, e),
            }
        }

        assignments
    }
}
