use serde::{Deserialize, Serialize};

use crate::ids::TicketId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A change notification for the ticket collection. Subscribers treat it as
/// an opaque "something changed" trigger; it deliberately carries no field
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub ticket_id: TicketId,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, ticket_id: TicketId) -> Self {
        Self { kind, ticket_id }
    }
}
