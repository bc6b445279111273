//! Identity provider seam.
//!
//! BroDesk does no authentication of its own; the provider only says who
//! the current actor is. `DbIdentity` trusts an upstream-supplied user key
//! (id or email) and resolves it against the profile tables.

use async_trait::async_trait;
use brodesk_common::{Actor, UserId};

use crate::desk::db::DbHandle;
use crate::errors::DeskError;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_actor(&self) -> Result<Actor, DeskError>;
}

/// Fixed identity, or none at all.
pub struct StaticIdentity(Option<Actor>);

impl StaticIdentity {
    pub fn new(actor: Actor) -> Self {
        Self(Some(actor))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_actor(&self) -> Result<Actor, DeskError> {
        self.0.clone().ok_or(DeskError::Unauthenticated)
    }
}

/// Resolves a user key (UUID or email) to an actor through the database.
pub struct DbIdentity {
    db: DbHandle,
    key: Option<String>,
}

impl DbIdentity {
    pub fn new(db: DbHandle, key: Option<String>) -> Self {
        Self { db, key }
    }

    pub async fn lookup(db: &DbHandle, key: &str) -> Result<Actor, DeskError> {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(DeskError::Unauthenticated);
        }
        let profile = db
            .call(move |db| match key.parse::<UserId>() {
                Ok(id) => db.get_profile(id),
                Err(_) => db.find_profile_by_email(&key),
            })
            .await?;
        profile
            .map(|p| p.actor())
            .ok_or(DeskError::Unauthenticated)
    }
}

#[async_trait]
impl IdentityProvider for DbIdentity {
    async fn current_actor(&self) -> Result<Actor, DeskError> {
        match &self.key {
            Some(key) => Self::lookup(&self.db, key).await,
            None => Err(DeskError::Unauthenticated),
        }
    }
}
