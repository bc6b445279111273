//! The single permission decision used by board gating, the HTTP service
//! and the store's defensive checks.

use brodesk_common::{Actor, Ticket, TicketPatch, UserId};

use crate::desk::visibility::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    QuickAction,
    EditStatus,
    Move,
    ChangePriority,
    Reassign,
    Comment { internal: bool },
    UploadAttachment,
    DeleteAttachment { uploader: UserId },
}

impl Action {
    /// Short description used in `Forbidden` errors and notices.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::View => "view ticket",
            Self::QuickAction => "run quick action",
            Self::EditStatus => "change status",
            Self::Move => "move ticket",
            Self::ChangePriority => "change priority",
            Self::Reassign => "reassign ticket",
            Self::Comment { internal: false } => "comment",
            Self::Comment { internal: true } => "post internal note",
            Self::UploadAttachment => "upload attachment",
            Self::DeleteAttachment { .. } => "delete attachment",
        }
    }
}

/// The actions a ticket patch exercises. Lifecycle timestamps ride along
/// with a status edit.
pub fn patch_actions(patch: &TicketPatch) -> Vec<Action> {
    let mut actions = Vec::new();
    if patch.status.is_some()
        || patch.resolved_at.is_some()
        || patch.resolved_by.is_some()
        || patch.closed_at.is_some()
    {
        actions.push(Action::EditStatus);
    }
    if patch.priority.is_some() {
        actions.push(Action::ChangePriority);
    }
    if patch.team_id.is_some() || patch.assigned_user_id.is_some() {
        actions.push(Action::Reassign);
    }
    actions
}

pub fn can_perform(actor: &Actor, ticket: &Ticket, action: Action) -> bool {
    let visible = Scope::for_actor(actor).admits(ticket);
    let staff = actor.role.is_staff();

    match action {
        Action::View | Action::UploadAttachment | Action::Comment { internal: false } => visible,
        Action::QuickAction
        | Action::EditStatus
        | Action::Move
        | Action::ChangePriority
        | Action::Comment { internal: true } => staff && visible,
        Action::Reassign => actor.role.is_admin(),
        Action::DeleteAttachment { uploader } => actor.id == uploader,
    }
}
