use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use brodesk_common::*;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::desk::visibility::Scope;
use crate::errors::DeskError;

/// Async-safe handle to the desk database.
///
/// Wraps `DeskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<DeskDb>>,
}

impl DbHandle {
    pub fn new(db: DeskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DeskDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Used by tests to seed
    /// fixtures; async code goes through [`DbHandle::call`].
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, DeskDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

/// A committed ticket update: the row before and after the patch.
#[derive(Debug, Clone)]
pub struct TicketUpdate {
    pub before: Ticket,
    pub after: Ticket,
}

pub struct DeskDb {
    conn: Connection,
}

const TICKET_SELECT: &str = "
    SELECT t.id, t.number, t.title, t.description, t.location, t.category_id,
           t.priority, t.status, t.reporter_id, t.is_anonymous, t.assigned_user_id,
           t.team_id, t.created_at, t.updated_at, t.resolved_at, t.resolved_by,
           t.closed_at, p.full_name, c.name, tm.name
    FROM tickets t
    LEFT JOIN profiles p ON p.id = t.reporter_id
    LEFT JOIN categories c ON c.id = t.category_id
    LEFT JOIN teams tm ON tm.id = t.team_id";

const PROFILE_SELECT: &str = "
    SELECT p.id, p.full_name, p.email, r.role, r.team_id, p.created_at
    FROM profiles p
    JOIN user_roles r ON r.user_id = p.id";

impl DeskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS teams (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profiles (
                    id TEXT PRIMARY KEY,
                    full_name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_roles (
                    user_id TEXT PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
                    role TEXT NOT NULL DEFAULT 'student',
                    team_id TEXT REFERENCES teams(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT,
                    team_id TEXT REFERENCES teams(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    id TEXT PRIMARY KEY,
                    number INTEGER NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    location TEXT,
                    category_id TEXT NOT NULL REFERENCES categories(id),
                    priority TEXT NOT NULL DEFAULT 'medium',
                    status TEXT NOT NULL DEFAULT 'open',
                    reporter_id TEXT NOT NULL REFERENCES profiles(id),
                    is_anonymous INTEGER NOT NULL DEFAULT 0,
                    assigned_user_id TEXT REFERENCES profiles(id),
                    team_id TEXT REFERENCES teams(id),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    resolved_at TEXT,
                    resolved_by TEXT REFERENCES profiles(id),
                    closed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS ticket_comments (
                    id TEXT PRIMARY KEY,
                    ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    author_id TEXT NOT NULL REFERENCES profiles(id),
                    message TEXT NOT NULL,
                    is_internal INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ticket_attachments (
                    id TEXT PRIMARY KEY,
                    ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    uploaded_by TEXT NOT NULL REFERENCES profiles(id),
                    file_name TEXT NOT NULL,
                    file_type TEXT,
                    file_url TEXT NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ticket_history (
                    id TEXT PRIMARY KEY,
                    ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
                    field_name TEXT NOT NULL,
                    old_value TEXT,
                    new_value TEXT,
                    changed_by TEXT NOT NULL REFERENCES profiles(id),
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tickets_team ON tickets(team_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_reporter ON tickets(reporter_id);
                CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
                CREATE INDEX IF NOT EXISTS idx_comments_ticket ON ticket_comments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_attachments_ticket ON ticket_attachments(ticket_id);
                CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_history(ticket_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, user: &NewUser) -> Result<Profile> {
        let email = user.email.trim().to_lowercase();
        if user.full_name.trim().is_empty() {
            return Err(DeskError::validation("full_name", "must not be empty").into());
        }
        if !email.contains('@') {
            return Err(DeskError::validation("email", "must be an email address").into());
        }
        if self.find_profile_by_email(&email)?.is_some() {
            return Err(DeskError::validation("email", format!("{} is already registered", email)).into());
        }
        if let Some(team_id) = user.team_id
            && self.get_team(team_id)?.is_none()
        {
            return Err(DeskError::validation("team_id", "unknown team").into());
        }

        let id = UserId::new();
        let now = stored_now();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO profiles (id, full_name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), user.full_name.trim(), email, ts_text(&now)],
        )
        .context("Failed to insert profile")?;
        tx.execute(
            "INSERT INTO user_roles (user_id, role, team_id) VALUES (?1, ?2, ?3)",
            params![
                id.to_string(),
                user.role.as_str(),
                user.team_id.map(|t| t.to_string())
            ],
        )
        .context("Failed to insert user role")?;
        tx.commit().context("Failed to commit user insert")?;

        self.get_profile(id)?.context("Profile not found after insert")
    }

    pub fn get_profile(&self, id: UserId) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                &format!("{PROFILE_SELECT} WHERE p.id = ?1"),
                params![id.to_string()],
                profile_row,
            )
            .optional()
            .context("Failed to query profile")?
            .map(ProfileRow::into_profile)
            .transpose()
    }

    pub fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.conn
            .query_row(
                &format!("{PROFILE_SELECT} WHERE p.email = ?1"),
                params![email.trim().to_lowercase()],
                profile_row,
            )
            .optional()
            .context("Failed to query profile by email")?
            .map(ProfileRow::into_profile)
            .transpose()
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROFILE_SELECT} ORDER BY p.full_name"))
            .context("Failed to prepare list_profiles")?;
        let rows = stmt
            .query_map([], profile_row)
            .context("Failed to query profiles")?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row.context("Failed to read profile row")?.into_profile()?);
        }
        Ok(profiles)
    }

    // ── Reference data ────────────────────────────────────────────────

    pub fn create_team(&self, name: &str, description: Option<&str>) -> Result<Team> {
        if name.trim().is_empty() {
            return Err(DeskError::validation("name", "must not be empty").into());
        }
        let team = Team {
            id: TeamId::new(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_at: stored_now(),
        };
        self.conn
            .execute(
                "INSERT INTO teams (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    team.id.to_string(),
                    team.name,
                    team.description,
                    ts_text(&team.created_at)
                ],
            )
            .context("Failed to insert team")?;
        Ok(team)
    }

    pub fn get_team(&self, id: TeamId) -> Result<Option<Team>> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM teams WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query team")?
            .map(|(id, name, description, created_at)| {
                Ok(Team {
                    id: parse_id(&id, "team id")?,
                    name,
                    description,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .transpose()
    }

    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM teams ORDER BY name")
            .context("Failed to prepare list_teams")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query teams")?;
        let mut teams = Vec::new();
        for row in rows {
            let (id, name, description, created_at) = row.context("Failed to read team row")?;
            teams.push(Team {
                id: parse_id(&id, "team id")?,
                name,
                description,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(teams)
    }

    pub fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        team_id: Option<TeamId>,
    ) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(DeskError::validation("name", "must not be empty").into());
        }
        if let Some(team_id) = team_id
            && self.get_team(team_id)?.is_none()
        {
            return Err(DeskError::validation("team_id", "unknown team").into());
        }
        let category = Category {
            id: CategoryId::new(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            team_id,
            created_at: stored_now(),
        };
        self.conn
            .execute(
                "INSERT INTO categories (id, name, description, team_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    category.id.to_string(),
                    category.name,
                    category.description,
                    category.team_id.map(|t| t.to_string()),
                    ts_text(&category.created_at)
                ],
            )
            .context("Failed to insert category")?;
        Ok(category)
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, name, description, team_id, created_at FROM categories WHERE id = ?1",
                params![id.to_string()],
                category_row,
            )
            .optional()
            .context("Failed to query category")?
            .map(CategoryRow::into_category)
            .transpose()
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, description, team_id, created_at FROM categories ORDER BY name",
            )
            .context("Failed to prepare list_categories")?;
        let rows = stmt
            .query_map([], category_row)
            .context("Failed to query categories")?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row.context("Failed to read category row")?.into_category()?);
        }
        Ok(categories)
    }

    // ── Tickets ───────────────────────────────────────────────────────

    /// Insert a submitted ticket. The display number and the routed team are
    /// assigned inside the same transaction as the insert.
    pub fn insert_ticket(&self, reporter_id: UserId, new: &NewTicket) -> Result<Ticket> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let routed_team: Option<Option<String>> = tx
            .query_row(
                "SELECT team_id FROM categories WHERE id = ?1",
                params![new.category_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up category")?;
        let Some(team_id) = routed_team else {
            return Err(DeskError::validation("category_id", "unknown category").into());
        };

        let number: i64 = tx
            .query_row("SELECT COALESCE(MAX(number), 0) + 1 FROM tickets", [], |row| {
                row.get(0)
            })
            .context("Failed to allocate ticket number")?;

        let id = TicketId::new();
        let now = ts_text(&stored_now());
        tx.execute(
            "INSERT INTO tickets (id, number, title, description, location, category_id,
                                  priority, status, reporter_id, is_anonymous, team_id,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9, ?10, ?11, ?11)",
            params![
                id.to_string(),
                number,
                new.title.trim(),
                new.description.trim(),
                new.location.as_deref().map(str::trim).filter(|l| !l.is_empty()),
                new.category_id.to_string(),
                new.priority.as_str(),
                reporter_id.to_string(),
                new.is_anonymous,
                team_id,
                now,
            ],
        )
        .context("Failed to insert ticket")?;
        tx.commit().context("Failed to commit ticket insert")?;

        self.get_ticket(id)?.context("Ticket not found after insert")
    }

    pub fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.conn
            .query_row(
                &format!("{TICKET_SELECT} WHERE t.id = ?1"),
                params![id.to_string()],
                ticket_row,
            )
            .optional()
            .context("Failed to query ticket")?
            .map(TicketRow::into_ticket)
            .transpose()
    }

    /// Tickets admitted by `scope`, newest first, with joined display names.
    pub fn query_tickets(&self, scope: &Scope) -> Result<Vec<Ticket>> {
        let (clause, arg) = match scope {
            Scope::All => ("", None),
            Scope::Team(team) => (" WHERE t.team_id = ?1", Some(team.to_string())),
            Scope::Reporter(user) => (" WHERE t.reporter_id = ?1", Some(user.to_string())),
        };
        let sql = format!("{TICKET_SELECT}{clause} ORDER BY t.created_at DESC, t.number DESC");
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare query_tickets")?;
        let rows = match &arg {
            Some(arg) => stmt.query_map(params![arg], ticket_row),
            None => stmt.query_map([], ticket_row),
        }
        .context("Failed to query tickets")?;

        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(row.context("Failed to read ticket row")?.into_ticket()?);
        }
        Ok(tickets)
    }

    /// Apply `patch` and append one history row per audited field change, all
    /// in one transaction. Returns `None` if the ticket doesn't exist.
    pub fn update_ticket(
        &self,
        id: TicketId,
        patch: &TicketPatch,
        changed_by: UserId,
    ) -> Result<Option<TicketUpdate>> {
        let Some(before) = self.get_ticket(id)? else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(TicketUpdate {
                after: before.clone(),
                before,
            }));
        }

        let changes = patch.audited_changes(&before);
        let now = ts_text(&stored_now());
        let key = id.to_string();

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let set = |column: &str, value: Option<String>| -> Result<()> {
            tx.execute(
                &format!("UPDATE tickets SET {column} = ?1 WHERE id = ?2"),
                params![value, key],
            )
            .with_context(|| format!("Failed to update ticket {column}"))?;
            Ok(())
        };
        if let Some(status) = patch.status {
            set("status", Some(status.as_str().to_string()))?;
        }
        if let Some(priority) = patch.priority {
            set("priority", Some(priority.as_str().to_string()))?;
        }
        if let Some(team_id) = patch.team_id {
            set("team_id", team_id.map(|t| t.to_string()))?;
        }
        if let Some(assigned) = patch.assigned_user_id {
            set("assigned_user_id", assigned.map(|u| u.to_string()))?;
        }
        if let Some(resolved_at) = patch.resolved_at {
            set("resolved_at", resolved_at.map(|t| ts_text(&t)))?;
        }
        if let Some(resolved_by) = patch.resolved_by {
            set("resolved_by", resolved_by.map(|u| u.to_string()))?;
        }
        if let Some(closed_at) = patch.closed_at {
            set("closed_at", closed_at.map(|t| ts_text(&t)))?;
        }
        set("updated_at", Some(now.clone()))?;

        for change in &changes {
            tx.execute(
                "INSERT INTO ticket_history (id, ticket_id, field_name, old_value, new_value,
                                             changed_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    HistoryId::new().to_string(),
                    key,
                    change.field,
                    change.old,
                    change.new,
                    changed_by.to_string(),
                    now,
                ],
            )
            .context("Failed to append ticket history")?;
        }

        tx.commit().context("Failed to commit ticket update")?;

        let after = self
            .get_ticket(id)?
            .context("Ticket not found after update")?;
        Ok(Some(TicketUpdate { before, after }))
    }

    // ── Comments, attachments, history ────────────────────────────────

    pub fn add_comment(
        &self,
        ticket_id: TicketId,
        author_id: UserId,
        comment: &NewComment,
    ) -> Result<Comment> {
        if comment.message.trim().is_empty() {
            return Err(DeskError::validation("message", "must not be empty").into());
        }
        let id = CommentId::new();
        let now = stored_now();
        self.conn
            .execute(
                "INSERT INTO ticket_comments (id, ticket_id, author_id, message, is_internal, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    ticket_id.to_string(),
                    author_id.to_string(),
                    comment.message.trim(),
                    comment.is_internal,
                    ts_text(&now)
                ],
            )
            .context("Failed to insert comment")?;

        let author_name = self.get_profile(author_id)?.map(|p| p.full_name);
        Ok(Comment {
            id,
            ticket_id,
            author_id,
            message: comment.message.trim().to_string(),
            is_internal: comment.is_internal,
            created_at: now,
            author_name,
        })
    }

    /// Comments on a ticket, oldest first.
    pub fn list_comments(&self, ticket_id: TicketId) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.author_id, c.message, c.is_internal, c.created_at, p.full_name
                 FROM ticket_comments c
                 LEFT JOIN profiles p ON p.id = c.author_id
                 WHERE c.ticket_id = ?1
                 ORDER BY c.created_at, c.rowid",
            )
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(params![ticket_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            let (id, author_id, message, is_internal, created_at, author_name) =
                row.context("Failed to read comment row")?;
            comments.push(Comment {
                id: parse_id(&id, "comment id")?,
                ticket_id,
                author_id: parse_id(&author_id, "author id")?,
                message,
                is_internal,
                created_at: parse_ts(&created_at)?,
                author_name,
            });
        }
        Ok(comments)
    }

    pub fn add_attachment(
        &self,
        ticket_id: TicketId,
        uploaded_by: UserId,
        new: &NewAttachment,
    ) -> Result<Attachment> {
        let attachment = Attachment {
            id: AttachmentId::new(),
            ticket_id,
            uploaded_by,
            file_name: new.file_name.trim().to_string(),
            file_type: new.file_type.clone(),
            file_url: new.file_url.clone(),
            size_bytes: new.size_bytes,
            created_at: stored_now(),
        };
        let size = i64::try_from(attachment.size_bytes).context("Attachment size overflows")?;
        self.conn
            .execute(
                "INSERT INTO ticket_attachments (id, ticket_id, uploaded_by, file_name, file_type,
                                                 file_url, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    attachment.id.to_string(),
                    ticket_id.to_string(),
                    uploaded_by.to_string(),
                    attachment.file_name,
                    attachment.file_type,
                    attachment.file_url,
                    size,
                    ts_text(&attachment.created_at)
                ],
            )
            .context("Failed to insert attachment")?;
        Ok(attachment)
    }

    pub fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>> {
        self.conn
            .query_row(
                "SELECT id, ticket_id, uploaded_by, file_name, file_type, file_url, size_bytes, created_at
                 FROM ticket_attachments WHERE id = ?1",
                params![id.to_string()],
                attachment_row,
            )
            .optional()
            .context("Failed to query attachment")?
            .map(AttachmentRow::into_attachment)
            .transpose()
    }

    pub fn list_attachments(&self, ticket_id: TicketId) -> Result<Vec<Attachment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, uploaded_by, file_name, file_type, file_url, size_bytes, created_at
                 FROM ticket_attachments WHERE ticket_id = ?1 ORDER BY created_at, rowid",
            )
            .context("Failed to prepare list_attachments")?;
        let rows = stmt
            .query_map(params![ticket_id.to_string()], attachment_row)
            .context("Failed to query attachments")?;
        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row.context("Failed to read attachment row")?.into_attachment()?);
        }
        Ok(attachments)
    }

    pub fn delete_attachment(&self, id: AttachmentId) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM ticket_attachments WHERE id = ?1",
                params![id.to_string()],
            )
            .context("Failed to delete attachment")?;
        Ok(count > 0)
    }

    /// Audit trail for a ticket, oldest first.
    pub fn list_history(&self, ticket_id: TicketId) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, field_name, old_value, new_value, changed_by, created_at
                 FROM ticket_history WHERE ticket_id = ?1 ORDER BY created_at, rowid",
            )
            .context("Failed to prepare list_history")?;
        let rows = stmt
            .query_map(params![ticket_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query history")?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, field_name, old_value, new_value, changed_by, created_at) =
                row.context("Failed to read history row")?;
            entries.push(HistoryEntry {
                id: parse_id(&id, "history id")?,
                ticket_id,
                field_name,
                old_value,
                new_value,
                changed_by: parse_id(&changed_by, "user id")?,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(entries)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Fixed-width RFC 3339 so TEXT ordering matches time ordering.
/// The current time at the precision timestamps are stored with, so values
/// returned from an insert equal what a later read yields.
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn ts_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}'", s))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_id<T>(s: &str, what: &str) -> Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    T::from_str(s).with_context(|| format!("Invalid {} '{}'", what, s))
}

fn parse_opt_id<T>(s: Option<String>, what: &str) -> Result<Option<T>>
where
    T: FromStr<Err = uuid::Error>,
{
    s.as_deref().map(|s| parse_id(s, what)).transpose()
}

/// Intermediate row struct for reading tickets from SQLite before converting
/// the TEXT columns into typed values.
struct TicketRow {
    id: String,
    number: i64,
    title: String,
    description: String,
    location: Option<String>,
    category_id: String,
    priority: String,
    status: String,
    reporter_id: String,
    is_anonymous: bool,
    assigned_user_id: Option<String>,
    team_id: Option<String>,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
    resolved_by: Option<String>,
    closed_at: Option<String>,
    reporter_name: Option<String>,
    category_name: Option<String>,
    team_name: Option<String>,
}

fn ticket_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        category_id: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        reporter_id: row.get(8)?,
        is_anonymous: row.get(9)?,
        assigned_user_id: row.get(10)?,
        team_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        resolved_at: row.get(14)?,
        resolved_by: row.get(15)?,
        closed_at: row.get(16)?,
        reporter_name: row.get(17)?,
        category_name: row.get(18)?,
        team_name: row.get(19)?,
    })
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket> {
        let status = TicketStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket status")?;
        let priority = Priority::from_str(&self.priority)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket priority")?;

        Ok(Ticket {
            id: parse_id(&self.id, "ticket id")?,
            number: u64::try_from(self.number).context("Negative ticket number")?,
            title: self.title,
            description: self.description,
            location: self.location,
            category_id: parse_id(&self.category_id, "category id")?,
            priority,
            status,
            reporter_id: parse_id(&self.reporter_id, "reporter id")?,
            is_anonymous: self.is_anonymous,
            assigned_user_id: parse_opt_id(self.assigned_user_id, "assignee id")?,
            team_id: parse_opt_id(self.team_id, "team id")?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            resolved_at: parse_opt_ts(self.resolved_at)?,
            resolved_by: parse_opt_id(self.resolved_by, "resolver id")?,
            closed_at: parse_opt_ts(self.closed_at)?,
            reporter_name: self.reporter_name,
            category_name: self.category_name,
            team_name: self.team_name,
        })
    }
}

struct ProfileRow {
    id: String,
    full_name: String,
    email: String,
    role: String,
    team_id: Option<String>,
    created_at: String,
}

fn profile_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        team_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl ProfileRow {
    fn into_profile(self) -> Result<Profile> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse user role")?;
        Ok(Profile {
            id: parse_id(&self.id, "user id")?,
            full_name: self.full_name,
            email: self.email,
            role,
            team_id: parse_opt_id(self.team_id, "team id")?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

struct CategoryRow {
    id: String,
    name: String,
    description: Option<String>,
    team_id: Option<String>,
    created_at: String,
}

fn category_row(row: &Row<'_>) -> rusqlite::Result<CategoryRow> {
    Ok(CategoryRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        team_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl CategoryRow {
    fn into_category(self) -> Result<Category> {
        Ok(Category {
            id: parse_id(&self.id, "category id")?,
            name: self.name,
            description: self.description,
            team_id: parse_opt_id(self.team_id, "team id")?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

struct AttachmentRow {
    id: String,
    ticket_id: String,
    uploaded_by: String,
    file_name: String,
    file_type: Option<String>,
    file_url: String,
    size_bytes: i64,
    created_at: String,
}

fn attachment_row(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        uploaded_by: row.get(2)?,
        file_name: row.get(3)?,
        file_type: row.get(4)?,
        file_url: row.get(5)?,
        size_bytes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl AttachmentRow {
    fn into_attachment(self) -> Result<Attachment> {
        Ok(Attachment {
            id: parse_id(&self.id, "attachment id")?,
            ticket_id: parse_id(&self.ticket_id, "ticket id")?,
            uploaded_by: parse_id(&self.uploaded_by, "user id")?,
            file_name: self.file_name,
            file_type: self.file_type,
            file_url: self.file_url,
            size_bytes: u64::try_from(self.size_bytes).context("Negative attachment size")?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Seed {
        team: Team,
        category: Category,
        reporter: Profile,
        staff: Profile,
    }

    fn seed(db: &DeskDb) -> Result<Seed> {
        let team = db.create_team("Facilities", Some("Buildings and rooms"))?;
        let category = db.create_category("Maintenance", None, Some(team.id))?;
        let reporter = db.create_user(&NewUser {
            full_name: "Sam Student".into(),
            email: "sam@example.edu".into(),
            role: Role::Student,
            team_id: None,
        })?;
        let staff = db.create_user(&NewUser {
            full_name: "Tess Tech".into(),
            email: "tess@example.edu".into(),
            role: Role::TeamMember,
            team_id: Some(team.id),
        })?;
        Ok(Seed {
            team,
            category,
            reporter,
            staff,
        })
    }

    fn new_ticket(category_id: CategoryId, title: &str) -> NewTicket {
        NewTicket {
            title: title.into(),
            description: "It is broken".into(),
            location: Some("Room 204".into()),
            category_id,
            priority: Priority::High,
            is_anonymous: false,
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
             ('teams', 'profiles', 'user_roles', 'categories', 'tickets',
              'ticket_comments', 'ticket_attachments', 'ticket_history')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 8);
        Ok(())
    }

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("desk.db");
        drop(DeskDb::new(&path)?);
        let db = DeskDb::new(&path)?;
        assert!(db.list_teams()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_create_user_and_lookup() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        assert_eq!(s.staff.role, Role::TeamMember);
        assert_eq!(s.staff.team_id, Some(s.team.id));

        let found = db.find_profile_by_email("TESS@example.edu")?.unwrap();
        assert_eq!(found.id, s.staff.id);
        assert_eq!(db.list_profiles()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_email_is_validation_error() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        seed(&db)?;
        let err = db
            .create_user(&NewUser {
                full_name: "Other Sam".into(),
                email: "sam@example.edu".into(),
                role: Role::Student,
                team_id: None,
            })
            .unwrap_err();
        assert!(matches!(
            DeskError::from(err),
            DeskError::Validation { ref field, .. } if field == "email"
        ));
        Ok(())
    }

    #[test]
    fn test_insert_ticket_routes_team_and_numbers_sequentially() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;

        let first = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "Leaky tap"))?;
        let second = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "No heat"))?;

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(second.display_number(), "TKT-00002");
        assert_eq!(first.status, TicketStatus::Open);
        assert_eq!(first.team_id, Some(s.team.id));
        assert_eq!(first.team_name.as_deref(), Some("Facilities"));
        assert_eq!(first.category_name.as_deref(), Some("Maintenance"));
        assert_eq!(first.reporter_name.as_deref(), Some("Sam Student"));
        Ok(())
    }

    #[test]
    fn test_insert_ticket_unknown_category() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        let err = db
            .insert_ticket(s.reporter.id, &new_ticket(CategoryId::new(), "Ghost"))
            .unwrap_err();
        assert!(matches!(DeskError::from(err), DeskError::Validation { .. }));
        Ok(())
    }

    #[test]
    fn test_query_tickets_by_scope() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        let unrouted = db.create_category("Other", None, None)?;
        let routed = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "Routed"))?;
        let loose = db.insert_ticket(s.staff.id, &new_ticket(unrouted.id, "Loose"))?;

        assert_eq!(db.query_tickets(&Scope::All)?.len(), 2);

        let team = db.query_tickets(&Scope::Team(s.team.id))?;
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].id, routed.id);

        let mine = db.query_tickets(&Scope::Reporter(s.staff.id))?;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, loose.id);
        Ok(())
    }

    #[test]
    fn test_update_ticket_appends_history_atomically() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        let ticket = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "Broken door"))?;

        let resolved_at = Utc::now();
        let patch = TicketPatch {
            status: Some(TicketStatus::Resolved),
            priority: Some(Priority::Urgent),
            resolved_at: Some(Some(resolved_at)),
            resolved_by: Some(Some(s.staff.id)),
            ..Default::default()
        };
        let update = db.update_ticket(ticket.id, &patch, s.staff.id)?.unwrap();
        assert_eq!(update.before.status, TicketStatus::Open);
        assert_eq!(update.after.status, TicketStatus::Resolved);
        assert_eq!(update.after.resolved_by, Some(s.staff.id));
        assert!(update.after.resolved_at.is_some());

        let history = db.list_history(ticket.id)?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].field_name, "status");
        assert_eq!(history[0].old_value.as_deref(), Some("open"));
        assert_eq!(history[0].new_value.as_deref(), Some("resolved"));
        assert_eq!(history[0].changed_by, s.staff.id);
        assert_eq!(history[1].field_name, "priority");
        Ok(())
    }

    #[test]
    fn test_update_missing_ticket_is_none() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        let patch = TicketPatch {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        assert!(db.update_ticket(TicketId::new(), &patch, s.staff.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_comments_and_attachments() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        let ticket = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "Wifi"))?;

        db.add_comment(
            ticket.id,
            s.staff.id,
            &NewComment {
                message: "Looking into it".into(),
                is_internal: false,
            },
        )?;
        db.add_comment(
            ticket.id,
            s.staff.id,
            &NewComment {
                message: "AP 3 is down".into(),
                is_internal: true,
            },
        )?;
        let comments = db.list_comments(ticket.id)?;
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].author_name.as_deref(), Some("Tess Tech"));
        assert!(comments[1].is_internal);

        let attachment = db.add_attachment(
            ticket.id,
            s.reporter.id,
            &NewAttachment {
                file_name: "photo.jpg".into(),
                file_type: Some("image/jpeg".into()),
                file_url: "https://files.example.edu/photo.jpg".into(),
                size_bytes: 2048,
            },
        )?;
        assert_eq!(db.list_attachments(ticket.id)?.len(), 1);
        assert_eq!(
            db.get_attachment(attachment.id)?.unwrap().uploaded_by,
            s.reporter.id
        );
        assert!(db.delete_attachment(attachment.id)?);
        assert!(!db.delete_attachment(attachment.id)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call() -> Result<()> {
        let handle = DbHandle::new(DeskDb::new_in_memory()?);
        let team = handle
            .call(|db| db.create_team("Registrar", None))
            .await?;
        let teams = handle.call(|db| db.list_teams()).await?;
        assert_eq!(teams, vec![team]);
        Ok(())
    }

    #[test]
    fn test_inserted_rows_equal_read_back() -> Result<()> {
        let db = DeskDb::new_in_memory()?;
        let s = seed(&db)?;
        assert_eq!(db.get_team(s.team.id)?, Some(s.team.clone()));
        assert_eq!(db.get_category(s.category.id)?, Some(s.category.clone()));
        assert_eq!(db.get_profile(s.reporter.id)?, Some(s.reporter.clone()));

        let ticket = db.insert_ticket(s.reporter.id, &new_ticket(s.category.id, "Leaky roof"))?;
        let comment = db.add_comment(
            ticket.id,
            s.staff.id,
            &NewComment {
                message: "Bucket placed".into(),
                is_internal: false,
            },
        )?;
        assert_eq!(db.list_comments(ticket.id)?, vec![comment]);

        let attachment = db.add_attachment(
            ticket.id,
            s.reporter.id,
            &NewAttachment {
                file_name: "roof.jpg".into(),
                file_type: Some("image/jpeg".into()),
                file_url: "https://files.example.edu/roof.jpg".into(),
                size_bytes: 2048,
            },
        )?;
        assert_eq!(db.get_attachment(attachment.id)?, Some(attachment));
        Ok(())
    }
}
