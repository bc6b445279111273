//! Ticket store seam and its SQLite implementation.

use std::sync::Arc;

use async_trait::async_trait;
use brodesk_common::*;
use chrono::Utc;

use crate::desk::db::{DbHandle, TicketUpdate};
use crate::desk::feed::ChangeFeed;
use crate::desk::lifecycle::with_side_effects;
use crate::desk::permissions::{Action, can_perform, patch_actions};
use crate::desk::visibility::Scope;
use crate::errors::DeskError;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Tickets admitted by `scope`, newest first, with joined display names.
    async fn query_tickets(&self, scope: &Scope) -> Result<Vec<Ticket>, DeskError>;

    /// Last-write-wins update of the fields present in `patch`.
    async fn update_ticket(
        &self,
        actor: &Actor,
        id: TicketId,
        patch: TicketPatch,
    ) -> Result<(), DeskError>;

    async fn insert_ticket(&self, actor: &Actor, ticket: NewTicket) -> Result<Ticket, DeskError>;

    async fn post_comment(
        &self,
        actor: &Actor,
        id: TicketId,
        comment: NewComment,
    ) -> Result<Comment, DeskError>;
}

pub fn validate_new_ticket(ticket: &NewTicket) -> Result<(), DeskError> {
    let title = ticket.title.trim();
    if title.is_empty() {
        return Err(DeskError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DeskError::validation(
            "title",
            format!("must be at most {} characters", MAX_TITLE_CHARS),
        ));
    }
    if ticket.description.trim().is_empty() {
        return Err(DeskError::validation("description", "must not be empty"));
    }
    Ok(())
}

/// Everything a ticket detail view shows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
    pub history: Vec<HistoryEntry>,
}

/// SQLite-backed store. Every committed write is published on the feed.
#[derive(Clone)]
pub struct SqliteTicketStore {
    db: DbHandle,
    feed: Arc<dyn ChangeFeed>,
}

impl SqliteTicketStore {
    pub fn new(db: DbHandle, feed: Arc<dyn ChangeFeed>) -> Self {
        Self { db, feed }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    /// A ticket the actor may view. Out-of-scope tickets are reported as
    /// missing.
    pub async fn visible_ticket(&self, actor: &Actor, id: TicketId) -> Result<Ticket, DeskError> {
        let actor = actor.clone();
        let ticket = self.db.call(move |db| db.get_ticket(id)).await?;
        ticket
            .filter(|t| can_perform(&actor, t, Action::View))
            .ok_or_else(|| DeskError::not_found("Ticket"))
    }

    /// Permission-checked update returning the row before and after.
    ///
    /// Lifecycle timestamps in `patch` are ignored; they are derived from
    /// the stored row and the patched status under the same lock as the
    /// write.
    pub async fn apply_patch(
        &self,
        actor: &Actor,
        id: TicketId,
        patch: TicketPatch,
    ) -> Result<TicketUpdate, DeskError> {
        let actor = actor.clone();
        let update = self
            .db
            .call(move |db| {
                let Some(current) = db.get_ticket(id)? else {
                    return Err(DeskError::not_found("Ticket").into());
                };
                if !can_perform(&actor, &current, Action::View) {
                    return Err(DeskError::not_found("Ticket").into());
                }
                let patch = with_side_effects(&current, patch, &actor, Utc::now());
                if let Some(denied) = patch_actions(&patch)
                    .into_iter()
                    .find(|a| !can_perform(&actor, &current, *a))
                {
                    return Err(DeskError::forbidden(denied.describe()).into());
                }
                db.update_ticket(id, &patch, actor.id)?
                    .ok_or_else(|| DeskError::not_found("Ticket").into())
            })
            .await?;

        self.feed.publish(ChangeEvent::new(ChangeKind::Update, id));
        Ok(update)
    }

    pub async fn detail(&self, actor: &Actor, id: TicketId) -> Result<TicketDetail, DeskError> {
        let ticket = self.visible_ticket(actor, id).await?;
        let (comments, attachments, history) = self
            .db
            .call(move |db| {
                Ok((
                    db.list_comments(id)?,
                    db.list_attachments(id)?,
                    db.list_history(id)?,
                ))
            })
            .await?;
        let comments = comments
            .into_iter()
            .filter(|c| crate::desk::visibility::comment_visible(actor, c))
            .collect();
        Ok(TicketDetail {
            ticket,
            comments,
            attachments,
            history,
        })
    }

    pub async fn add_comment(
        &self,
        actor: &Actor,
        id: TicketId,
        comment: NewComment,
    ) -> Result<Comment, DeskError> {
        let ticket = self.visible_ticket(actor, id).await?;
        let action = Action::Comment {
            internal: comment.is_internal,
        };
        if !can_perform(actor, &ticket, action) {
            return Err(DeskError::forbidden(action.describe()));
        }
        let author = actor.id;
        Ok(self
            .db
            .call(move |db| db.add_comment(id, author, &comment))
            .await?)
    }

    pub async fn add_attachment(
        &self,
        actor: &Actor,
        id: TicketId,
        attachment: NewAttachment,
    ) -> Result<Attachment, DeskError> {
        if attachment.file_name.trim().is_empty() {
            return Err(DeskError::validation("file_name", "must not be empty"));
        }
        if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(DeskError::validation(
                "size_bytes",
                "attachments are limited to 10 MB",
            ));
        }
        let ticket = self.visible_ticket(actor, id).await?;
        if !can_perform(actor, &ticket, Action::UploadAttachment) {
            return Err(DeskError::forbidden(Action::UploadAttachment.describe()));
        }
        let uploader = actor.id;
        Ok(self
            .db
            .call(move |db| db.add_attachment(id, uploader, &attachment))
            .await?)
    }

    pub async fn delete_attachment(
        &self,
        actor: &Actor,
        id: AttachmentId,
    ) -> Result<(), DeskError> {
        let attachment = self
            .db
            .call(move |db| db.get_attachment(id))
            .await?
            .ok_or_else(|| DeskError::not_found("Attachment"))?;
        let ticket = self.visible_ticket(actor, attachment.ticket_id).await?;
        let action = Action::DeleteAttachment {
            uploader: attachment.uploaded_by,
        };
        if !can_perform(actor, &ticket, action) {
            return Err(DeskError::forbidden(action.describe()));
        }
        self.db.call(move |db| db.delete_attachment(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn query_tickets(&self, scope: &Scope) -> Result<Vec<Ticket>, DeskError> {
        let scope = *scope;
        Ok(self.db.call(move |db| db.query_tickets(&scope)).await?)
    }

    async fn update_ticket(
        &self,
        actor: &Actor,
        id: TicketId,
        patch: TicketPatch,
    ) -> Result<(), DeskError> {
        self.apply_patch(actor, id, patch).await.map(|_| ())
    }

    async fn insert_ticket(&self, actor: &Actor, ticket: NewTicket) -> Result<Ticket, DeskError> {
        validate_new_ticket(&ticket)?;
        let reporter = actor.id;
        let inserted = self
            .db
            .call(move |db| db.insert_ticket(reporter, &ticket))
            .await?;
        self.feed
            .publish(ChangeEvent::new(ChangeKind::Insert, inserted.id));
        Ok(inserted)
    }

    async fn post_comment(
        &self,
        actor: &Actor,
        id: TicketId,
        comment: NewComment,
    ) -> Result<Comment, DeskError> {
        self.add_comment(actor, id, comment).await
    }
}
