use uuid::Uuid;

use crate::persistence::types::BackendId;

/// How a backend record was tied to a local item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The record echoed the item's `client_ref`.
    Exact,
    /// Positional pairing inside the trailing time window.
    Windowed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub local_id: Uuid,
    pub backend_id: BackendId,
    pub kind: MatchKind,
}
