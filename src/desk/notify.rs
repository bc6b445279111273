//! Notification sink seam, its webhook and log implementations, and the
//! rules deriving notifications from ticket changes.
//!
//! Delivery is fire-and-forget: a failed notification is logged and shown
//! as a warning but never undoes the change that triggered it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use brodesk_common::{Actor, Comment, Profile, Ticket, TicketStatus, UserId};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::NotificationsSection;
use crate::desk::db::DbHandle;
use crate::errors::DeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TicketAssigned,
    TicketStatusChanged,
    TicketComment,
    TicketResolved,
    UserCreated,
}

/// Body of a `send-notification` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub recipient_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub data: serde_json::Value,
}

impl NotificationRequest {
    fn new(kind: NotificationKind, recipient_id: UserId, data: serde_json::Value) -> Self {
        Self {
            kind,
            recipient_id,
            recipient_email: None,
            recipient_name: None,
            data,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, request: NotificationRequest) -> Result<(), DeskError>;
}

fn ticket_data(ticket: &Ticket) -> serde_json::Value {
    json!({
        "ticketId": ticket.id,
        "ticketNumber": ticket.display_number(),
        "title": ticket.title,
    })
}

/// Notifications owed for a committed ticket change.
pub fn ticket_change_notifications(before: &Ticket, after: &Ticket) -> Vec<NotificationRequest> {
    let mut out = Vec::new();

    if after.assigned_user_id != before.assigned_user_id
        && let Some(assignee) = after.assigned_user_id
    {
        out.push(NotificationRequest::new(
            NotificationKind::TicketAssigned,
            assignee,
            ticket_data(after),
        ));
    }

    if after.status != before.status {
        let mut data = ticket_data(after);
        data["oldStatus"] = json!(before.status);
        data["newStatus"] = json!(after.status);
        let kind = if after.status == TicketStatus::Resolved {
            NotificationKind::TicketResolved
        } else {
            NotificationKind::TicketStatusChanged
        };
        out.push(NotificationRequest::new(kind, after.reporter_id, data));
    }

    out
}

/// A public staff reply notifies the reporter.
pub fn comment_notification(
    ticket: &Ticket,
    comment: &Comment,
    author: &Actor,
) -> Option<NotificationRequest> {
    if comment.is_internal || !author.role.is_staff() || author.id == ticket.reporter_id {
        return None;
    }
    let mut data = ticket_data(ticket);
    data["message"] = json!(comment.message);
    data["author"] = json!(comment.author_name.clone().or_else(|| author.display_name.clone()));
    Some(NotificationRequest::new(
        NotificationKind::TicketComment,
        ticket.reporter_id,
        data,
    ))
}

pub fn user_created_notification(profile: &Profile) -> NotificationRequest {
    NotificationRequest {
        kind: NotificationKind::UserCreated,
        recipient_id: profile.id,
        recipient_email: Some(profile.email.clone()),
        recipient_name: Some(profile.full_name.clone()),
        data: json!({ "role": profile.role }),
    }
}

/// Sends notifications, logging (not propagating) failures. Returns the
/// failure messages for callers that surface warnings.
pub async fn dispatch(sink: &dyn NotificationSink, requests: Vec<NotificationRequest>) -> Vec<String> {
    let mut failures = Vec::new();
    for request in requests {
        let kind = request.kind;
        if let Err(e) = sink.notify(request).await {
            tracing::warn!(?kind, error = %e, "notification failed");
            failures.push(e.to_string());
        }
    }
    failures
}

/// Logs notifications instead of delivering them.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, request: NotificationRequest) -> Result<(), DeskError> {
        info!(
            kind = ?request.kind,
            recipient = %request.recipient_id,
            data = %request.data,
            "notification requested"
        );
        Ok(())
    }
}

/// Posts notifications to a `send-notification` endpoint.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    directory: Option<DbHandle>,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build notification HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            directory: None,
        })
    }

    /// Fill missing recipient email/name from the profile table.
    pub fn with_directory(mut self, db: DbHandle) -> Self {
        self.directory = Some(db);
        self
    }

    async fn address(&self, request: &mut NotificationRequest) -> Result<(), DeskError> {
        let Some(db) = &self.directory else {
            return Ok(());
        };
        if request.recipient_email.is_some() {
            return Ok(());
        }
        let id = request.recipient_id;
        if let Some(profile) = db.call(move |db| db.get_profile(id)).await? {
            request.recipient_email = Some(profile.email);
            request.recipient_name = Some(profile.full_name);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, mut request: NotificationRequest) -> Result<(), DeskError> {
        self.address(&mut request)
            .await
            .map_err(|e| DeskError::Sink(e.to_string()))?;

        self.client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeskError::Sink(format!("send-notification request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| DeskError::Sink(format!("send-notification rejected: {}", e)))?;
        Ok(())
    }
}

/// The sink configured in `[notifications]`.
pub fn sink_from_config(
    section: &NotificationsSection,
    directory: Option<DbHandle>,
) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match (&section.webhook_url, section.enabled) {
        (Some(url), true) => {
            let mut sink = WebhookSink::new(url.clone(), Duration::from_secs(section.timeout_secs))?;
            if let Some(db) = directory {
                sink = sink.with_directory(db);
            }
            Ok(Arc::new(sink))
        }
        _ => Ok(Arc::new(LogSink)),
    }
}
