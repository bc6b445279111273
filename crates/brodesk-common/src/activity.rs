use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AttachmentId, CommentId, HistoryId, TicketId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub ticket_id: TicketId,
    pub author_id: UserId,
    pub message: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub message: String,
    #[serde(default)]
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub ticket_id: TicketId,
    pub uploaded_by: UserId,
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_url: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata. The file itself lives in external object storage;
/// `file_url` points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttachment {
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    pub file_url: String,
    pub size_bytes: u64,
}

/// Append-only audit record of a single field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub ticket_id: TicketId,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: UserId,
    pub created_at: DateTime<Utc>,
}
