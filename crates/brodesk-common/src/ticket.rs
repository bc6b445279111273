use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{CategoryId, TeamId, TicketId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    NeedInfo,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Board column order.
    pub const ALL: [TicketStatus; 5] = [
        Self::Open,
        Self::InProgress,
        Self::NeedInfo,
        Self::Resolved,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::NeedInfo => "need_info",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::NeedInfo => "Need Info",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "need_info" => Ok(Self::NeedInfo),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Ticket priority. Variant order is the urgency order, so `Ord` compares
/// `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Sequential display number, rendered by [`Ticket::display_number`].
    pub number: u64,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub category_id: CategoryId,
    pub priority: Priority,
    pub status: TicketStatus,
    pub reporter_id: UserId,
    pub is_anonymous: bool,
    pub assigned_user_id: Option<UserId>,
    pub team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub closed_at: Option<DateTime<Utc>>,

    // Joined display fields, filled in by scoped queries.
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
}

impl Ticket {
    pub fn display_number(&self) -> String {
        format!("TKT-{:05}", self.number)
    }
}

/// Fields required to submit a ticket. Status, number and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub category_id: CategoryId,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Deserialize a present field (including `null`) as `Some(value)` so that
/// `Option<Option<T>>` can tell "absent" from "set to null".
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A partial update to a ticket. `None` leaves a field untouched; for the
/// nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Option<TeamId>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<Option<UserId>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Option<UserId>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Option<DateTime<Utc>>>,
}

/// One audited field change, as recorded in ticket history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply every present field to `ticket`.
    pub fn apply(&self, ticket: &mut Ticket) {
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(priority) = self.priority {
            ticket.priority = priority;
        }
        if let Some(team_id) = self.team_id {
            ticket.team_id = team_id;
        }
        if let Some(assigned) = self.assigned_user_id {
            ticket.assigned_user_id = assigned;
        }
        if let Some(resolved_at) = self.resolved_at {
            ticket.resolved_at = resolved_at;
        }
        if let Some(resolved_by) = self.resolved_by {
            ticket.resolved_by = resolved_by;
        }
        if let Some(closed_at) = self.closed_at {
            ticket.closed_at = closed_at;
        }
    }

    /// Audited changes this patch makes relative to `before`.
    ///
    /// Only status, priority, team and assignee are audited; the lifecycle
    /// timestamps are side effects of a status change and ride along with its
    /// entry. Fields whose value would not change produce nothing.
    pub fn audited_changes(&self, before: &Ticket) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        if let Some(status) = self.status
            && status != before.status
        {
            changes.push(FieldChange {
                field: "status",
                old: Some(before.status.to_string()),
                new: Some(status.to_string()),
            });
        }
        if let Some(priority) = self.priority
            && priority != before.priority
        {
            changes.push(FieldChange {
                field: "priority",
                old: Some(before.priority.to_string()),
                new: Some(priority.to_string()),
            });
        }
        if let Some(team_id) = self.team_id
            && team_id != before.team_id
        {
            changes.push(FieldChange {
                field: "team_id",
                old: before.team_id.map(|t| t.to_string()),
                new: team_id.map(|t| t.to_string()),
            });
        }
        if let Some(assigned) = self.assigned_user_id
            && assigned != before.assigned_user_id
        {
            changes.push(FieldChange {
                field: "assigned_user_id",
                old: before.assigned_user_id.map(|u| u.to_string()),
                new: assigned.map(|u| u.to_string()),
            });
        }
        changes
    }
}
