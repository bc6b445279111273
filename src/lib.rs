//! BroDesk: a role-based ticket desk whose kanban board reconciles local
//! edits with a shared ticket store and its change feed.
//!
//! - [`desk`] holds the domain: storage, visibility and permission rules,
//!   status lifecycle, the board reconciler and session, and the HTTP service.
//! - [`config`] loads `brodesk.toml` with environment overrides.
//! - [`logging`] installs the tracing subscriber.

pub mod config;
pub mod desk;
pub mod errors;
pub mod logging;
