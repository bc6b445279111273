use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use brodesk_common::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::analytics::TicketStats;
use super::db::DbHandle;
use super::drag::DEFAULT_ACTIVATION_DISTANCE;
use super::feed::BroadcastFeed;
use super::identity::{DbIdentity, IdentityProvider};
use super::lifecycle::QuickAction;
use super::notify::{self, NotificationRequest, NotificationSink};
use super::permissions::{Action, can_perform};
use super::reconciler::BoardView;
use super::store::{SqliteTicketStore, TicketDetail, TicketStore};
use super::visibility::Scope;
use super::ws;
use crate::errors::DeskError;

/// Header carrying the acting user's id or email, set by the upstream
/// identity proxy.
pub const USER_HEADER: &str = "x-brodesk-user";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub store: SqliteTicketStore,
    pub feed: BroadcastFeed,
    pub sink: Arc<dyn NotificationSink>,
    pub board: BoardSettings,
}

impl AppState {
    pub fn new(db: DbHandle, feed: BroadcastFeed, sink: Arc<dyn NotificationSink>) -> Self {
        let store = SqliteTicketStore::new(db.clone(), Arc::new(feed.clone()));
        Self {
            db,
            store,
            feed,
            sink,
            board: BoardSettings::default(),
        }
    }

    pub fn with_board_settings(mut self, board: BoardSettings) -> Self {
        self.board = board;
        self
    }

    /// Deliver in the background; failures are only logged.
    fn notify(&self, requests: Vec<NotificationRequest>) {
        if requests.is_empty() {
            return;
        }
        let sink = self.sink.clone();
        tokio::spawn(async move {
            notify::dispatch(sink.as_ref(), requests).await;
        });
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<TeamId>,
}

/// Board interaction settings for clients that render the board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoardSettings {
    pub drag_activation_distance: f64,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            drag_activation_distance: DEFAULT_ACTIVATION_DISTANCE,
        }
    }
}

#[derive(Serialize)]
pub struct TicketDetailResponse {
    #[serde(flatten)]
    pub detail: TicketDetail,
    pub reporter: String,
    pub quick_actions: Vec<QuickAction>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        let msg = err.to_string();
        match err {
            DeskError::Unauthenticated => ApiError::Unauthorized(msg),
            DeskError::Forbidden { .. } => ApiError::Forbidden(msg),
            DeskError::NotFound { .. } => ApiError::NotFound(msg),
            DeskError::Validation { .. } => ApiError::Unprocessable(msg),
            DeskError::Store(_) | DeskError::Sink(_) => ApiError::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        DeskError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Acting user ───────────────────────────────────────────────────────

/// The actor named by [`USER_HEADER`]. Missing or unknown users are 401.
pub struct CurrentActor(pub Actor);

impl FromRequestParts<SharedState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let actor = DbIdentity::new(state.db.clone(), key)
            .current_actor()
            .await?;
        Ok(CurrentActor(actor))
    }
}

fn require_admin(actor: &Actor, action: &str) -> Result<(), ApiError> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(DeskError::forbidden(action).into())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/board", get(get_board))
        .route("/api/board/settings", get(board_settings))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/{id}", get(get_ticket).patch(update_ticket))
        .route("/api/tickets/{id}/comments", post(add_comment))
        .route("/api/tickets/{id}/attachments", post(add_attachment))
        .route("/api/attachments/{id}", delete(delete_attachment))
        .route("/api/teams", get(list_teams).post(create_team))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/users", post(create_user))
        .route("/api/analytics", get(analytics))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn me(CurrentActor(actor): CurrentActor) -> Json<Actor> {
    Json(actor)
}

async fn get_board(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .store
        .query_tickets(&Scope::for_actor(&actor))
        .await?;
    Ok(Json(BoardView::build(&actor, &tickets)))
}

async fn board_settings(State(state): State<SharedState>) -> Json<BoardSettings> {
    Json(state.board)
}

async fn list_tickets(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state
        .store
        .query_tickets(&Scope::for_actor(&actor))
        .await?;
    Ok(Json(tickets))
}

async fn create_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<NewTicket>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.store.insert_ticket(&actor, req).await?;
    info!(ticket = %ticket.display_number(), reporter = %actor.id, "ticket submitted");
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<TicketId>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.store.detail(&actor, id).await?;
    let quick_actions = if can_perform(&actor, &detail.ticket, Action::QuickAction) {
        super::lifecycle::quick_actions(detail.ticket.status)
    } else {
        Vec::new()
    };
    let reporter = super::visibility::reporter_label(&actor, &detail.ticket);
    Ok(Json(TicketDetailResponse {
        detail,
        reporter,
        quick_actions,
    }))
}

/// Lifecycle timestamps follow from `status` and cannot be patched directly.
async fn update_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<TicketId>,
    Json(patch): Json<TicketPatch>,
) -> Result<impl IntoResponse, ApiError> {
    if patch.is_empty() {
        return Err(DeskError::validation("patch", "no fields to update").into());
    }
    for (field, present) in [
        ("resolved_at", patch.resolved_at.is_some()),
        ("resolved_by", patch.resolved_by.is_some()),
        ("closed_at", patch.closed_at.is_some()),
    ] {
        if present {
            return Err(DeskError::validation(field, "set by status changes only").into());
        }
    }

    let update = state.store.apply_patch(&actor, id, patch).await?;
    state.notify(notify::ticket_change_notifications(
        &update.before,
        &update.after,
    ));
    Ok(Json(update.after))
}

async fn add_comment(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<TicketId>,
    Json(req): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.store.add_comment(&actor, id, req).await?;
    let ticket = state.store.visible_ticket(&actor, id).await?;
    state.notify(
        notify::comment_notification(&ticket, &comment, &actor)
            .into_iter()
            .collect(),
    );
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn add_attachment(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<TicketId>,
    Json(req): Json<NewAttachment>,
) -> Result<impl IntoResponse, ApiError> {
    let attachment = state.store.add_attachment(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn delete_attachment(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<AttachmentId>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_attachment(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_teams(
    State(state): State<SharedState>,
    CurrentActor(_): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    let teams = state.db.call(|db| db.list_teams()).await?;
    Ok(Json(teams))
}

async fn create_team(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateTeamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor, "manage teams")?;
    let team = state
        .db
        .call(move |db| db.create_team(&req.name, req.description.as_deref()))
        .await?;
    Ok((StatusCode::CREATED, Json(team)))
}

async fn list_categories(
    State(state): State<SharedState>,
    CurrentActor(_): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state.db.call(|db| db.list_categories()).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor, "manage categories")?;
    let category = state
        .db
        .call(move |db| db.create_category(&req.name, req.description.as_deref(), req.team_id))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn create_user(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor, "manage users")?;
    let profile = state.db.call(move |db| db.create_user(&req)).await?;
    info!(user = %profile.id, role = %profile.role, "user created");
    state.notify(vec![notify::user_created_notification(&profile)]);
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn analytics(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor, "view analytics")?;
    let (tickets, categories) = state
        .db
        .call(|db| Ok((db.query_tickets(&Scope::All)?, db.list_categories()?)))
        .await?;
    Ok(Json(TicketStats::compute(&tickets, &categories)))
}
