//! Ticket status transitions.
//!
//! There are two surfaces over the same status field:
//!
//! - [`guided_transition`] follows the quick-action graph and rejects
//!   actions whose origin state doesn't match;
//! - [`free_transition`] is the privileged status edit (and board drag) and
//!   accepts any pair of states.
//!
//! Both produce a [`StatusTransition`] whose patch carries the lifecycle
//! timestamp side effects for the target state.

use brodesk_common::{Actor, Ticket, TicketPatch, TicketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    StartWorking,
    MarkResolved,
    Close,
    Reopen,
}

impl QuickAction {
    pub const ALL: [QuickAction; 4] = [
        Self::StartWorking,
        Self::MarkResolved,
        Self::Close,
        Self::Reopen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartWorking => "start_working",
            Self::MarkResolved => "mark_resolved",
            Self::Close => "close",
            Self::Reopen => "reopen",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StartWorking => "Start Working",
            Self::MarkResolved => "Mark Resolved",
            Self::Close => "Close Ticket",
            Self::Reopen => "Reopen",
        }
    }

    pub fn target(&self) -> TicketStatus {
        match self {
            Self::StartWorking => TicketStatus::InProgress,
            Self::MarkResolved => TicketStatus::Resolved,
            Self::Close => TicketStatus::Closed,
            Self::Reopen => TicketStatus::Open,
        }
    }

    pub fn allowed_from(&self, status: TicketStatus) -> bool {
        use TicketStatus::*;
        match self {
            Self::StartWorking => status == Open,
            Self::MarkResolved => matches!(status, InProgress | NeedInfo),
            Self::Close => status == Resolved,
            Self::Reopen => status == Closed,
        }
    }
}

impl std::fmt::Display for QuickAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuickAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_working" | "start" => Ok(Self::StartWorking),
            "mark_resolved" | "resolve" => Ok(Self::MarkResolved),
            "close" => Ok(Self::Close),
            "reopen" => Ok(Self::Reopen),
            _ => Err(format!("Invalid quick action: {}", s)),
        }
    }
}

/// Quick actions offered for a ticket in `status`.
pub fn quick_actions(status: TicketStatus) -> Vec<QuickAction> {
    QuickAction::ALL
        .into_iter()
        .filter(|a| a.allowed_from(status))
        .collect()
}

/// A status change together with its timestamp side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub from: TicketStatus,
    pub to: TicketStatus,
    patch: TicketPatch,
}

impl StatusTransition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    pub fn patch(&self) -> &TicketPatch {
        &self.patch
    }

    pub fn into_patch(self) -> TicketPatch {
        self.patch
    }

    pub fn apply(&self, ticket: &mut Ticket) {
        self.patch.apply(ticket);
    }
}

/// Run a quick action. Fails if the ticket's status is not a valid origin.
pub fn guided_transition(
    ticket: &Ticket,
    action: QuickAction,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StatusTransition, DeskError> {
    if !action.allowed_from(ticket.status) {
        return Err(DeskError::validation(
            "status",
            format!(
                "'{}' is not available for a ticket in {}",
                action.label(),
                ticket.status.title()
            ),
        ));
    }
    Ok(free_transition(ticket, action.target(), actor, now))
}

/// `patch` as the store writes it against `current`: lifecycle timestamps
/// are derived from the status transition, never taken from the caller.
pub fn with_side_effects(
    current: &Ticket,
    mut patch: TicketPatch,
    actor: &Actor,
    now: DateTime<Utc>,
) -> TicketPatch {
    patch.resolved_at = None;
    patch.resolved_by = None;
    patch.closed_at = None;
    if let Some(to) = patch.status {
        let side = free_transition(current, to, actor, now).into_patch();
        patch.resolved_at = side.resolved_at;
        patch.resolved_by = side.resolved_by;
        patch.closed_at = side.closed_at;
    }
    patch
}

/// Move a ticket to any status.
///
/// Entering `resolved` stamps `resolved_at`/`resolved_by` unless already
/// set, entering `closed` stamps `closed_at` unless already set, and
/// reopening (`closed` to `open`) clears all three.
pub fn free_transition(
    ticket: &Ticket,
    target: TicketStatus,
    actor: &Actor,
    now: DateTime<Utc>,
) -> StatusTransition {
    let mut patch = TicketPatch {
        status: Some(target),
        ..Default::default()
    };

    if ticket.status != target {
        match target {
            TicketStatus::Resolved => {
                if ticket.resolved_at.is_none() {
                    patch.resolved_at = Some(Some(now));
                }
                if ticket.resolved_by.is_none() {
                    patch.resolved_by = Some(Some(actor.id));
                }
            }
            TicketStatus::Closed => {
                if ticket.closed_at.is_none() {
                    patch.closed_at = Some(Some(now));
                }
            }
            TicketStatus::Open if ticket.status == TicketStatus::Closed => {
                patch.resolved_at = Some(None);
                patch.resolved_by = Some(None);
                patch.closed_at = Some(None);
            }
            _ => {}
        }
    }

    StatusTransition {
        from: ticket.status,
        to: target,
        patch,
    }
}
