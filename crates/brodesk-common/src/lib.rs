//! Shared domain types for BroDesk.
//!
//! Everything here is plain data: identifiers, the ticket record and its
//! enumerations, people and reference entities, and the change-feed event.
//! Behavior (visibility, lifecycle, permissions) lives in the `brodesk` crate.

pub mod activity;
pub mod change;
pub mod ids;
pub mod people;
pub mod ticket;

pub use activity::{Attachment, Comment, HistoryEntry, NewAttachment, NewComment};
pub use change::{ChangeEvent, ChangeKind};
pub use ids::{AttachmentId, CategoryId, CommentId, HistoryId, TeamId, TicketId, UserId};
pub use people::{Actor, Category, NewUser, Profile, Role, Team};
pub use ticket::{FieldChange, NewTicket, Priority, Ticket, TicketPatch, TicketStatus};
