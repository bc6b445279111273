//! The ticket desk.
//!
//! Rules, all pure:
//! - `visibility`: role scope and reporter/comment presentation
//! - `lifecycle`: quick actions and status transitions
//! - `permissions`: the single `can_perform` decision
//! - `drag`: pointer gestures over the board
//! - `analytics`: ticket statistics
//!
//! Client state:
//! - `reconciler`: optimistic local board state and resync
//! - `session`: a mounted board driven by a background task
//!
//! Collaborator seams and their implementations:
//! - `identity`, `store` + `db`, `feed`, `notify`
//!
//! HTTP service:
//! - `api`, `ws`, `server`

pub mod analytics;
pub mod api;
pub mod db;
pub mod drag;
pub mod feed;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod permissions;
pub mod reconciler;
pub mod server;
pub mod session;
pub mod store;
pub mod visibility;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

pub use db::{DbHandle, DeskDb};
pub use feed::{BroadcastFeed, ChangeFeed};
pub use reconciler::{BoardAction, BoardView, Notice, NoticeLevel, Reconciler};
pub use session::BoardSession;
pub use store::{SqliteTicketStore, TicketStore};
