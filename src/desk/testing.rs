//! In-memory doubles for the store and notification seams.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brodesk_common::*;
use chrono::Utc;

use crate::desk::feed::{BroadcastFeed, ChangeFeed};
use crate::desk::notify::{NotificationRequest, NotificationSink};
use crate::desk::store::TicketStore;
use crate::desk::visibility::Scope;
use crate::errors::DeskError;

pub fn ticket_fixture() -> Ticket {
    let now = Utc::now();
    Ticket {
        id: TicketId::new(),
        number: 1,
        title: "Broken projector".to_string(),
        description: "Room 204 projector flickers".to_string(),
        location: Some("Room 204".to_string()),
        category_id: CategoryId::new(),
        priority: Priority::Medium,
        status: TicketStatus::Open,
        reporter_id: UserId::new(),
        is_anonymous: false,
        assigned_user_id: None,
        team_id: None,
        created_at: now,
        updated_at: now,
        resolved_at: None,
        resolved_by: None,
        closed_at: None,
        reporter_name: Some("Sam Student".to_string()),
        category_name: None,
        team_name: None,
    }
}

#[derive(Default)]
struct MemoryState {
    tickets: Vec<Ticket>,
    history: Vec<FieldChange>,
    comments: Vec<Comment>,
    writes: usize,
    fail_writes: bool,
}

/// Ticket store over a vector. Writes publish to the attached feed, if any.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    feed: Option<BroadcastFeed>,
}

impl MemoryStore {
    pub fn new(tickets: Vec<Ticket>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                tickets,
                ..Default::default()
            })),
            feed: None,
        }
    }

    pub fn with_feed(mut self, feed: BroadcastFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state.lock().unwrap().tickets.clone()
    }

    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.tickets().into_iter().find(|t| t.id == id)
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    pub fn history(&self) -> Vec<FieldChange> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state.lock().unwrap().comments.clone()
    }

    /// Change a ticket behind the board's back, as another client would.
    pub fn external_update(&self, id: TicketId, patch: TicketPatch) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(t) = state.tickets.iter_mut().find(|t| t.id == id) {
                patch.apply(t);
            }
        }
        self.publish(ChangeKind::Update, id);
    }

    fn publish(&self, kind: ChangeKind, id: TicketId) {
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::new(kind, id));
        }
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn query_tickets(&self, scope: &Scope) -> Result<Vec<Ticket>, DeskError> {
        let state = self.state.lock().unwrap();
        Ok(scope.filter(state.tickets.clone()))
    }

    async fn update_ticket(
        &self,
        actor: &Actor,
        id: TicketId,
        patch: TicketPatch,
    ) -> Result<(), DeskError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(DeskError::Store(anyhow::anyhow!("write rejected")));
            }
            let Some(index) = state.tickets.iter().position(|t| t.id == id) else {
                return Err(DeskError::not_found("Ticket"));
            };
            let changes = patch.audited_changes(&state.tickets[index]);
            let ticket = &mut state.tickets[index];
            patch.apply(ticket);
            ticket.updated_at = Utc::now();
            state.history.extend(changes);
            state.writes += 1;
            tracing::debug!(actor = %actor.id, "memory store write");
        }
        self.publish(ChangeKind::Update, id);
        Ok(())
    }

    async fn insert_ticket(&self, actor: &Actor, new: NewTicket) -> Result<Ticket, DeskError> {
        let ticket = {
            let mut state = self.state.lock().unwrap();
            let mut ticket = ticket_fixture();
            ticket.number = state.tickets.len() as u64 + 1;
            ticket.title = new.title;
            ticket.description = new.description;
            ticket.location = new.location;
            ticket.category_id = new.category_id;
            ticket.priority = new.priority;
            ticket.is_anonymous = new.is_anonymous;
            ticket.reporter_id = actor.id;
            ticket.reporter_name = actor.display_name.clone();
            state.tickets.insert(0, ticket.clone());
            state.writes += 1;
            ticket
        };
        self.publish(ChangeKind::Insert, ticket.id);
        Ok(ticket)
    }

    async fn post_comment(
        &self,
        actor: &Actor,
        id: TicketId,
        comment: NewComment,
    ) -> Result<Comment, DeskError> {
        let comment = Comment {
            id: CommentId::new(),
            ticket_id: id,
            author_id: actor.id,
            message: comment.message,
            is_internal: comment.is_internal,
            created_at: Utc::now(),
            author_name: actor.display_name.clone(),
        };
        self.state.lock().unwrap().comments.push(comment.clone());
        Ok(comment)
    }
}

/// Records every request; fails them all when `failing`.
#[derive(Clone, Default)]
pub struct RecordingSink {
    requests: Arc<Mutex<Vec<NotificationRequest>>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, request: NotificationRequest) -> Result<(), DeskError> {
        self.requests.lock().unwrap().push(request);
        if self.failing {
            return Err(DeskError::Sink("mail relay unavailable".into()));
        }
        Ok(())
    }
}
