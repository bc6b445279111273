//! Client-local board state.
//!
//! The reconciler owns the tickets visible to one actor. User actions are
//! applied optimistically and handed back as a [`PendingWrite`] for the
//! caller to submit; any change-feed event, and any failed write, leads to
//! a full scoped resync that replaces local state wholesale.
//!
//! Resyncs are numbered when issued. A result older than the last one
//! applied is discarded, so concurrent resyncs finishing out of order never
//! move the board backwards.

use brodesk_common::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::desk::lifecycle::{self, QuickAction};
use crate::desk::permissions::{Action, can_perform};
use crate::desk::visibility::{Scope, reporter_label};
use crate::errors::DeskError;

/// A user-initiated mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardAction {
    /// Board drag onto another column.
    Move { ticket_id: TicketId, to: TicketStatus },
    Quick { ticket_id: TicketId, action: QuickAction },
    /// Status edit dialog; `message` is posted as a public comment.
    EditStatus {
        ticket_id: TicketId,
        to: TicketStatus,
        message: Option<String>,
    },
    ChangePriority { ticket_id: TicketId, priority: Priority },
    Reassign {
        ticket_id: TicketId,
        team_id: Option<TeamId>,
        assignee: Option<UserId>,
    },
}

impl BoardAction {
    pub fn ticket_id(&self) -> TicketId {
        match self {
            Self::Move { ticket_id, .. }
            | Self::Quick { ticket_id, .. }
            | Self::EditStatus { ticket_id, .. }
            | Self::ChangePriority { ticket_id, .. }
            | Self::Reassign { ticket_id, .. } => *ticket_id,
        }
    }

    fn permission(&self) -> Action {
        match self {
            Self::Move { .. } => Action::Move,
            Self::Quick { .. } => Action::QuickAction,
            Self::EditStatus { .. } => Action::EditStatus,
            Self::ChangePriority { .. } => Action::ChangePriority,
            Self::Reassign { .. } => Action::Reassign,
        }
    }

    /// Human name of the action, used in notices.
    pub fn label(&self) -> String {
        match self {
            Self::Move { to, .. } => format!("move ticket to {}", to.title()),
            Self::Quick { action, .. } => action.label().to_lowercase(),
            Self::EditStatus { to, .. } => format!("change status to {}", to.title()),
            Self::ChangePriority { priority, .. } => format!("set priority to {}", priority),
            Self::Reassign { .. } => "reassign ticket".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A dismissible user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// An optimistic change already applied locally, waiting to be written.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub action: BoardAction,
    pub ticket_id: TicketId,
    pub patch: TicketPatch,
    pub before: Ticket,
    pub after: Ticket,
}

impl PendingWrite {
    /// Comment to post alongside a status edit.
    pub fn status_comment(&self) -> Option<NewComment> {
        match &self.action {
            BoardAction::EditStatus {
                to,
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(NewComment {
                message: format!("Status updated to \"{}\"\n\n{}", to.as_str(), message.trim()),
                is_internal: false,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardCard {
    pub id: TicketId,
    pub number: String,
    pub title: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub reporter: String,
    pub category: Option<String>,
    pub team: Option<String>,
    pub assigned_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Quick actions the viewer may run from the card.
    pub quick_actions: Vec<QuickAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    /// Column id; equals the status wire name and is the drop target id.
    pub id: &'static str,
    pub title: &'static str,
    pub tickets: Vec<BoardCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub columns: Vec<BoardColumn>,
}

impl BoardView {
    /// Five columns in status order, cards in the order given.
    pub fn build(viewer: &Actor, tickets: &[Ticket]) -> Self {
        let columns = TicketStatus::ALL
            .into_iter()
            .map(|status| BoardColumn {
                id: status.as_str(),
                title: status.title(),
                tickets: tickets
                    .iter()
                    .filter(|t| t.status == status)
                    .map(|t| card(viewer, t))
                    .collect(),
            })
            .collect();
        Self { columns }
    }

    pub fn column(&self, status: TicketStatus) -> Option<&BoardColumn> {
        self.columns.iter().find(|c| c.id == status.as_str())
    }
}

fn card(viewer: &Actor, ticket: &Ticket) -> BoardCard {
    let quick_actions = if can_perform(viewer, ticket, Action::QuickAction) {
        lifecycle::quick_actions(ticket.status)
    } else {
        Vec::new()
    };
    BoardCard {
        id: ticket.id,
        number: ticket.display_number(),
        title: ticket.title.clone(),
        priority: ticket.priority,
        status: ticket.status,
        reporter: reporter_label(viewer, ticket),
        category: ticket.category_name.clone(),
        team: ticket.team_name.clone(),
        assigned_user_id: ticket.assigned_user_id,
        created_at: ticket.created_at,
        quick_actions,
    }
}

pub struct Reconciler {
    actor: Actor,
    scope: Scope,
    tickets: Vec<Ticket>,
    issued_seq: u64,
    applied_seq: u64,
    notices: Vec<Notice>,
}

impl Reconciler {
    /// The scope is fixed here; role or team changes apply on the next mount.
    pub fn new(actor: Actor) -> Self {
        let scope = Scope::for_actor(&actor);
        Self {
            actor,
            scope,
            tickets: Vec::new(),
            issued_seq: 0,
            applied_seq: 0,
            notices: Vec::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    pub fn board(&self) -> BoardView {
        BoardView::build(&self.actor, &self.tickets)
    }

    /// Number a new resync.
    pub fn begin_resync(&mut self) -> u64 {
        self.issued_seq += 1;
        self.issued_seq
    }

    /// Apply a resync result. Returns whether local state was replaced.
    pub fn finish_resync(&mut self, seq: u64, result: Result<Vec<Ticket>, DeskError>) -> bool {
        match result {
            Ok(_) if seq <= self.applied_seq => false,
            Ok(tickets) => {
                let fresh = self.scope.filter(tickets);
                // The first load has nothing to compare against.
                if self.applied_seq > 0 && self.actor.role.is_staff() {
                    let alerts = change_alerts(&self.actor, &self.tickets, &fresh);
                    self.notices.extend(alerts);
                }
                self.tickets = fresh;
                self.applied_seq = seq;
                true
            }
            Err(e) => {
                self.push(NoticeLevel::Error, format!("Failed to refresh board: {}", e));
                false
            }
        }
    }

    /// Check and optimistically apply `action`.
    ///
    /// `Ok(None)` means the action would not change anything and nothing
    /// should be written.
    pub fn prepare(
        &mut self,
        action: BoardAction,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingWrite>, DeskError> {
        let ticket_id = action.ticket_id();
        let current = self
            .ticket(ticket_id)
            .ok_or_else(|| DeskError::not_found("Ticket"))?;

        // Dropping a card back on its own column is never an error.
        if matches!(&action,
            BoardAction::Move { to, .. } | BoardAction::EditStatus { to, .. } if *to == current.status)
        {
            return Ok(None);
        }

        let permission = action.permission();
        if !can_perform(&self.actor, current, permission) {
            return Err(DeskError::forbidden(permission.describe()));
        }

        let patch = match &action {
            BoardAction::Move { to, .. } | BoardAction::EditStatus { to, .. } => {
                let transition = lifecycle::free_transition(current, *to, &self.actor, now);
                if transition.is_noop() {
                    return Ok(None);
                }
                transition.into_patch()
            }
            BoardAction::Quick { action: quick, .. } => {
                lifecycle::guided_transition(current, *quick, &self.actor, now)?.into_patch()
            }
            BoardAction::ChangePriority { priority, .. } => {
                if current.priority == *priority {
                    return Ok(None);
                }
                TicketPatch {
                    priority: Some(*priority),
                    ..Default::default()
                }
            }
            BoardAction::Reassign {
                team_id, assignee, ..
            } => TicketPatch {
                team_id: (current.team_id != *team_id).then_some(*team_id),
                assigned_user_id: (current.assigned_user_id != *assignee).then_some(*assignee),
                ..Default::default()
            },
        };
        if patch.is_empty() {
            return Ok(None);
        }

        let before = current.clone();
        let Some(local) = self.tickets.iter_mut().find(|t| t.id == ticket_id) else {
            return Err(DeskError::not_found("Ticket"));
        };
        patch.apply(local);
        local.updated_at = now;
        let after = local.clone();

        Ok(Some(PendingWrite {
            action,
            ticket_id,
            patch,
            before,
            after,
        }))
    }

    pub fn write_succeeded(&mut self, write: &PendingWrite) {
        self.push(
            NoticeLevel::Info,
            format!("{}: {}", write.after.display_number(), capitalize(&write.action.label())),
        );
    }

    /// Record a failed write and roll the optimistic value back, unless a
    /// resync has replaced it already. The caller must still resync.
    pub fn write_failed(&mut self, write: &PendingWrite, error: &DeskError) {
        if let Some(local) = self
            .tickets
            .iter_mut()
            .find(|t| t.id == write.ticket_id && **t == write.after)
        {
            *local = write.before.clone();
        }
        self.push(
            NoticeLevel::Error,
            format!(
                "Failed to {} ({}): {}",
                write.action.label(),
                write.before.display_number(),
                error
            ),
        );
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message.into());
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn push(&mut self, level: NoticeLevel, message: String) {
        self.notices.push(Notice { level, message });
    }
}

/// Alerts for changes made elsewhere: tickets newly assigned to the actor,
/// status changes, and escalations to urgent.
fn change_alerts(actor: &Actor, previous: &[Ticket], fresh: &[Ticket]) -> Vec<Notice> {
    let mut alerts = Vec::new();
    for ticket in fresh {
        let number = ticket.display_number();
        let old = previous.iter().find(|t| t.id == ticket.id);
        let assigned_before = old.and_then(|t| t.assigned_user_id);
        if ticket.assigned_user_id == Some(actor.id) && assigned_before != Some(actor.id) {
            alerts.push(Notice {
                level: NoticeLevel::Info,
                message: format!("{} was assigned to you", number),
            });
        }
        let Some(old) = old else {
            continue;
        };
        if old.status != ticket.status {
            alerts.push(Notice {
                level: NoticeLevel::Info,
                message: format!("{} was {}", number, status_verb(ticket.status)),
            });
        }
        if old.priority != Priority::Urgent && ticket.priority == Priority::Urgent {
            alerts.push(Notice {
                level: NoticeLevel::Warning,
                message: format!("{} was marked as URGENT", number),
            });
        }
    }
    alerts
}

fn status_verb(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "reopened",
        TicketStatus::InProgress => "marked as in progress",
        TicketStatus::NeedInfo => "marked as needing info",
        TicketStatus::Resolved => "resolved",
        TicketStatus::Closed => "closed",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::testing::ticket_fixture;
    use chrono::Duration;

    fn team_member(team: TeamId) -> Actor {
        Actor::new(UserId::new(), Role::TeamMember, Some(team))
    }

    fn team_ticket(team: TeamId, status: TicketStatus) -> Ticket {
        let mut t = ticket_fixture();
        t.team_id = Some(team);
        t.status = status;
        t
    }

    fn loaded(actor: Actor, tickets: Vec<Ticket>) -> Reconciler {
        let mut r = Reconciler::new(actor);
        let seq = r.begin_resync();
        assert!(r.finish_resync(seq, Ok(tickets)));
        r
    }

    #[test]
    fn test_resync_applies_scope() {
        let t1 = TeamId::new();
        let mine = team_ticket(t1, TicketStatus::Open);
        let theirs = team_ticket(TeamId::new(), TicketStatus::Open);
        let r = loaded(team_member(t1), vec![mine.clone(), theirs]);
        assert_eq!(r.tickets(), &[mine]);
    }

    #[test]
    fn test_resync_is_idempotent() {
        let t1 = TeamId::new();
        let tickets = vec![
            team_ticket(t1, TicketStatus::Open),
            team_ticket(t1, TicketStatus::NeedInfo),
        ];
        let mut r = loaded(team_member(t1), tickets.clone());
        let once = r.tickets().to_vec();

        let seq = r.begin_resync();
        r.finish_resync(seq, Ok(tickets.clone()));
        let seq = r.begin_resync();
        r.finish_resync(seq, Ok(tickets));
        assert_eq!(r.tickets(), once.as_slice());
    }

    #[test]
    fn test_stale_resync_is_discarded() {
        let t1 = TeamId::new();
        let old = team_ticket(t1, TicketStatus::Open);
        let mut new = old.clone();
        new.status = TicketStatus::Resolved;

        let mut r = Reconciler::new(team_member(t1));
        let first = r.begin_resync();
        let second = r.begin_resync();
        assert!(r.finish_resync(second, Ok(vec![new.clone()])));
        assert!(!r.finish_resync(first, Ok(vec![old])));
        assert_eq!(r.tickets(), &[new]);
    }

    #[test]
    fn test_failed_resync_keeps_state_and_notifies() {
        let t1 = TeamId::new();
        let mut r = loaded(team_member(t1), vec![team_ticket(t1, TicketStatus::Open)]);
        let seq = r.begin_resync();
        assert!(!r.finish_resync(seq, Err(DeskError::Store(anyhow::anyhow!("offline")))));
        assert_eq!(r.tickets().len(), 1);
        let notices = r.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_drop_on_same_column_is_noop() {
        let t1 = TeamId::new();
        let ticket = team_ticket(t1, TicketStatus::InProgress);
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);
        let write = r
            .prepare(
                BoardAction::Move {
                    ticket_id: ticket.id,
                    to: TicketStatus::InProgress,
                },
                Utc::now(),
            )
            .unwrap();
        assert!(write.is_none());
        assert_eq!(r.tickets(), &[ticket]);
    }

    #[test]
    fn test_move_applies_optimistically() {
        let t1 = TeamId::new();
        let actor = team_member(t1);
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(actor.clone(), vec![ticket.clone()]);
        let now = Utc::now();

        let write = r
            .prepare(
                BoardAction::Move {
                    ticket_id: ticket.id,
                    to: TicketStatus::Resolved,
                },
                now,
            )
            .unwrap()
            .unwrap();

        assert_eq!(write.before.status, TicketStatus::Open);
        assert_eq!(write.patch.status, Some(TicketStatus::Resolved));
        assert_eq!(write.patch.resolved_at, Some(Some(now)));
        assert_eq!(write.patch.resolved_by, Some(Some(actor.id)));

        let local = r.ticket(ticket.id).unwrap();
        assert_eq!(local.status, TicketStatus::Resolved);
        assert_eq!(local.resolved_at, Some(now));
    }

    #[test]
    fn test_student_cannot_move() {
        let ticket = ticket_fixture();
        let reporter = Actor::new(ticket.reporter_id, Role::Student, None);
        let mut r = loaded(reporter, vec![ticket.clone()]);
        let err = r
            .prepare(
                BoardAction::Move {
                    ticket_id: ticket.id,
                    to: TicketStatus::Closed,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DeskError::Forbidden { .. }));
        assert_eq!(r.ticket(ticket.id).unwrap().status, TicketStatus::Open);
    }

    #[test]
    fn test_student_drop_on_current_column_is_noop() {
        let ticket = ticket_fixture();
        let reporter = Actor::new(ticket.reporter_id, Role::Student, None);
        let mut r = loaded(reporter, vec![ticket.clone()]);
        for action in [
            BoardAction::Move {
                ticket_id: ticket.id,
                to: TicketStatus::Open,
            },
            BoardAction::EditStatus {
                ticket_id: ticket.id,
                to: TicketStatus::Open,
                message: None,
            },
        ] {
            assert!(r.prepare(action, Utc::now()).unwrap().is_none());
        }
        assert!(r.drain_notices().is_empty());
    }

    #[test]
    fn test_resync_alerts_staff_to_outside_changes() {
        let t1 = TeamId::new();
        let actor = team_member(t1);
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(actor.clone(), vec![ticket.clone()]);
        assert!(r.drain_notices().is_empty());

        let mut changed = ticket.clone();
        changed.status = TicketStatus::Resolved;
        changed.priority = Priority::Urgent;
        changed.assigned_user_id = Some(actor.id);
        let seq = r.begin_resync();
        assert!(r.finish_resync(seq, Ok(vec![changed.clone()])));

        let notices = r.drain_notices();
        let messages: Vec<_> = notices.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(
            messages,
            [
                "TKT-00001 was assigned to you",
                "TKT-00001 was resolved",
                "TKT-00001 was marked as URGENT",
            ]
        );
        assert_eq!(notices[2].level, NoticeLevel::Warning);

        // Unchanged on the next resync: nothing new to announce.
        let seq = r.begin_resync();
        r.finish_resync(seq, Ok(vec![changed]));
        assert!(r.drain_notices().is_empty());
    }

    #[test]
    fn test_own_optimistic_change_is_not_announced() {
        let t1 = TeamId::new();
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);
        let now = Utc::now();
        let write = r
            .prepare(
                BoardAction::Move {
                    ticket_id: ticket.id,
                    to: TicketStatus::InProgress,
                },
                now,
            )
            .unwrap()
            .unwrap();

        let seq = r.begin_resync();
        r.finish_resync(seq, Ok(vec![write.after.clone()]));
        assert!(r.drain_notices().is_empty());
    }

    #[test]
    fn test_failed_write_rollback_is_not_announced() {
        let t1 = TeamId::new();
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);
        let write = r
            .prepare(
                BoardAction::Quick {
                    ticket_id: ticket.id,
                    action: QuickAction::StartWorking,
                },
                Utc::now(),
            )
            .unwrap()
            .unwrap();
        r.write_failed(&write, &DeskError::Store(anyhow::anyhow!("offline")));
        assert_eq!(r.ticket(ticket.id).unwrap().status, TicketStatus::Open);

        let seq = r.begin_resync();
        r.finish_resync(seq, Ok(vec![ticket]));
        let notices = r.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_students_get_no_change_alerts() {
        let ticket = ticket_fixture();
        let reporter = Actor::new(ticket.reporter_id, Role::Student, None);
        let mut r = loaded(reporter, vec![ticket.clone()]);
        let mut changed = ticket;
        changed.status = TicketStatus::Resolved;
        let seq = r.begin_resync();
        assert!(r.finish_resync(seq, Ok(vec![changed])));
        assert!(r.drain_notices().is_empty());
    }

    #[test]
    fn test_unknown_ticket_is_not_found() {
        let t1 = TeamId::new();
        let mut r = loaded(team_member(t1), Vec::new());
        let err = r
            .prepare(
                BoardAction::ChangePriority {
                    ticket_id: TicketId::new(),
                    priority: Priority::High,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DeskError::NotFound { .. }));
    }

    #[test]
    fn test_quick_action_from_wrong_state_is_rejected_without_change() {
        let t1 = TeamId::new();
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);
        let err = r
            .prepare(
                BoardAction::Quick {
                    ticket_id: ticket.id,
                    action: QuickAction::Reopen,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation { .. }));
        assert_eq!(r.tickets(), &[ticket]);
    }

    #[test]
    fn test_reopen_via_quick_action() {
        let t1 = TeamId::new();
        let mut ticket = team_ticket(t1, TicketStatus::Closed);
        ticket.resolved_at = Some(Utc::now() - Duration::days(2));
        ticket.closed_at = Some(Utc::now() - Duration::days(1));
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);

        r.prepare(
            BoardAction::Quick {
                ticket_id: ticket.id,
                action: QuickAction::Reopen,
            },
            Utc::now(),
        )
        .unwrap()
        .unwrap();
        let local = r.ticket(ticket.id).unwrap();
        assert_eq!(local.status, TicketStatus::Open);
        assert!(local.resolved_at.is_none());
        assert!(local.closed_at.is_none());
    }

    #[test]
    fn test_reassign_only_patches_changed_fields() {
        let admin = Actor::new(UserId::new(), Role::Admin, None);
        let team = TeamId::new();
        let mut ticket = ticket_fixture();
        ticket.team_id = Some(team);
        let mut r = loaded(admin, vec![ticket.clone()]);

        let assignee = UserId::new();
        let write = r
            .prepare(
                BoardAction::Reassign {
                    ticket_id: ticket.id,
                    team_id: Some(team),
                    assignee: Some(assignee),
                },
                Utc::now(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(write.patch.team_id, None);
        assert_eq!(write.patch.assigned_user_id, Some(Some(assignee)));

        let again = r
            .prepare(
                BoardAction::Reassign {
                    ticket_id: ticket.id,
                    team_id: Some(team),
                    assignee: Some(assignee),
                },
                Utc::now(),
            )
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_write_failed_names_action() {
        let t1 = TeamId::new();
        let ticket = team_ticket(t1, TicketStatus::Open);
        let mut r = loaded(team_member(t1), vec![ticket.clone()]);
        let write = r
            .prepare(
                BoardAction::Move {
                    ticket_id: ticket.id,
                    to: TicketStatus::InProgress,
                },
                Utc::now(),
            )
            .unwrap()
            .unwrap();
        r.write_failed(&write, &DeskError::Store(anyhow::anyhow!("timeout")));
        let notices = r.drain_notices();
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("move ticket to In Progress"));
        assert!(r.drain_notices().is_empty());
    }

    #[test]
    fn test_status_comment_formatting() {
        let ticket = ticket_fixture();
        let write = PendingWrite {
            action: BoardAction::EditStatus {
                ticket_id: ticket.id,
                to: TicketStatus::NeedInfo,
                message: Some("Which room exactly?".into()),
            },
            ticket_id: ticket.id,
            patch: TicketPatch::default(),
            before: ticket.clone(),
            after: ticket,
        };
        let comment = write.status_comment().unwrap();
        assert_eq!(
            comment.message,
            "Status updated to \"need_info\"\n\nWhich room exactly?"
        );
        assert!(!comment.is_internal);
    }

    #[test]
    fn test_board_has_five_columns_and_gated_actions() {
        let ticket = ticket_fixture();
        let reporter = Actor::new(ticket.reporter_id, Role::Student, None);
        let board = loaded(reporter, vec![ticket.clone()]).board();
        let ids: Vec<_> = board.columns.iter().map(|c| c.id).collect();
        assert_eq!(ids, ["open", "in_progress", "need_info", "resolved", "closed"]);

        let open = board.column(TicketStatus::Open).unwrap();
        assert_eq!(open.tickets.len(), 1);
        assert!(open.tickets[0].quick_actions.is_empty());

        let admin = Actor::new(UserId::new(), Role::Admin, None);
        let board = BoardView::build(&admin, &[ticket]);
        assert_eq!(
            board.column(TicketStatus::Open).unwrap().tickets[0].quick_actions,
            vec![QuickAction::StartWorking]
        );
    }
}
