//! Ticket commands. `board`, `move`, `act`, `priority` and `assign` mount a
//! board session for the acting user and go through its reconciler, the
//! same as any other client.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use brodesk::config::DeskConfig;
use brodesk::desk::analytics::TicketStats;
use brodesk::desk::db::DbHandle;
use brodesk::desk::feed::BroadcastFeed;
use brodesk::desk::identity::{DbIdentity, StaticIdentity};
use brodesk::desk::lifecycle::QuickAction;
use brodesk::desk::notify;
use brodesk::desk::reconciler::{BoardAction, BoardView, Notice, NoticeLevel};
use brodesk::desk::session::BoardSession;
use brodesk::desk::store::{SqliteTicketStore, TicketStore};
use brodesk::desk::visibility::Scope;
use brodesk_common::{Actor, NewTicket, Priority, Ticket, TicketStatus};

use super::{open_db, resolve_actor, team_by_name};

pub struct Submission {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub location: Option<String>,
    pub anonymous: bool,
}

fn store_for(config: &DeskConfig, db: &DbHandle) -> (SqliteTicketStore, BroadcastFeed) {
    let feed = BroadcastFeed::new(config.toml.board.feed_capacity);
    (SqliteTicketStore::new(db.clone(), Arc::new(feed.clone())), feed)
}

async fn mount(config: &DeskConfig, user: Option<&str>) -> Result<(BoardSession, DbHandle)> {
    let db = open_db(config)?;
    let actor = resolve_actor(&db, user).await?;
    let (store, feed) = store_for(config, &db);
    let sink = notify::sink_from_config(&config.toml.notifications, Some(db.clone()))?;
    let session =
        BoardSession::mount(&StaticIdentity::new(actor), Arc::new(store), &feed, sink)
            .await?
            .with_drag_distance(config.toml.board.drag_activation_distance);
    Ok((session, db))
}

/// Find a ticket by display number (`TKT-00042`), bare number or id.
pub fn find_ticket<'a>(tickets: &'a [Ticket], key: &str) -> Option<&'a Ticket> {
    let key = key.trim();
    let upper = key.to_ascii_uppercase();
    let digits = upper.strip_prefix("TKT-").unwrap_or(&upper);
    let number = digits.parse::<u64>().ok();
    tickets
        .iter()
        .find(|t| Some(t.number) == number || t.id.to_string() == key)
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

/// Perform one board action on the ticket named by `key` and wait for it
/// to settle. Fails if the action is rejected or the write fails.
async fn run_action(
    config: &DeskConfig,
    user: Option<&str>,
    key: &str,
    action: impl FnOnce(&Ticket) -> BoardAction,
) -> Result<()> {
    let (session, _db) = mount(config, user).await?;
    let tickets = session.tickets().await?;
    let Some(ticket) = find_ticket(&tickets, key) else {
        session.unmount().await;
        bail!("Ticket '{}' not found", key);
    };
    let number = ticket.display_number();
    let action = action(ticket);

    let outcome = session.perform(action).await;
    let wrote = match outcome {
        Ok(wrote) => wrote,
        Err(e) => {
            session.unmount().await;
            return Err(e).with_context(|| format!("Cannot update {}", number));
        }
    };
    if !wrote {
        println!("{}: nothing to change", number);
    }

    session.settle().await?;
    let notices = session.notices().await?;
    session.unmount().await;

    print_notices(&notices);
    if notices.iter().any(|n| n.level == NoticeLevel::Error) {
        bail!("Update of {} failed", number);
    }
    Ok(())
}

pub async fn cmd_submit(config: &DeskConfig, user: Option<&str>, sub: Submission) -> Result<()> {
    let db = open_db(config)?;
    let actor = resolve_actor(&db, user).await?;
    let categories = db.call(|db| db.list_categories()).await?;
    let category = categories
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(sub.category.trim()))
        .with_context(|| format!("Unknown category '{}'", sub.category))?;

    let (store, _feed) = store_for(config, &db);
    let ticket = store
        .insert_ticket(
            &actor,
            NewTicket {
                title: sub.title,
                description: sub.description,
                location: sub.location,
                category_id: category.id,
                priority: sub.priority,
                is_anonymous: sub.anonymous,
            },
        )
        .await?;
    println!("Submitted {}: {}", ticket.display_number(), ticket.title);
    Ok(())
}

fn render_board(board: &BoardView) -> String {
    let mut out = String::new();
    for column in &board.columns {
        out.push_str(&format!("{} ({})\n", column.title, column.tickets.len()));
        for card in &column.tickets {
            out.push_str(&format!(
                "  {}  {:<7} {}  [{}]",
                card.number,
                card.priority.as_str(),
                card.title,
                card.reporter
            ));
            if !card.quick_actions.is_empty() {
                let actions: Vec<_> = card.quick_actions.iter().map(|a| a.as_str()).collect();
                out.push_str(&format!("  -> {}", actions.join(", ")));
            }
            out.push('\n');
        }
    }
    out
}

pub async fn cmd_board(config: &DeskConfig, user: Option<&str>, json: bool) -> Result<()> {
    let (session, _db) = mount(config, user).await?;
    let board = session.board().await?;
    let notices = session.notices().await?;
    session.unmount().await;

    print_notices(&notices);
    if json {
        println!("{}", serde_json::to_string_pretty(&board)?);
    } else {
        print!("{}", render_board(&board));
    }
    Ok(())
}

pub async fn cmd_move(
    config: &DeskConfig,
    user: Option<&str>,
    key: &str,
    to: TicketStatus,
    message: Option<String>,
) -> Result<()> {
    run_action(config, user, key, |ticket| match message {
        Some(message) => BoardAction::EditStatus {
            ticket_id: ticket.id,
            to,
            message: Some(message),
        },
        None => BoardAction::Move {
            ticket_id: ticket.id,
            to,
        },
    })
    .await
}

pub async fn cmd_act(
    config: &DeskConfig,
    user: Option<&str>,
    key: &str,
    action: QuickAction,
) -> Result<()> {
    run_action(config, user, key, |ticket| BoardAction::Quick {
        ticket_id: ticket.id,
        action,
    })
    .await
}

pub async fn cmd_priority(
    config: &DeskConfig,
    user: Option<&str>,
    key: &str,
    priority: Priority,
) -> Result<()> {
    run_action(config, user, key, |ticket| BoardAction::ChangePriority {
        ticket_id: ticket.id,
        priority,
    })
    .await
}

pub async fn cmd_assign(
    config: &DeskConfig,
    user: Option<&str>,
    key: &str,
    team: Option<&str>,
    assignee: Option<&str>,
) -> Result<()> {
    let db = open_db(config)?;
    let team_id = match team {
        Some(name) => Some(team_by_name(&db, name).await?.id),
        None => None,
    };
    let assignee = match assignee {
        Some(key) => Some(
            DbIdentity::lookup(&db, key)
                .await
                .with_context(|| format!("Unknown user '{}'", key))?
                .id,
        ),
        None => None,
    };
    run_action(config, user, key, |ticket| BoardAction::Reassign {
        ticket_id: ticket.id,
        team_id,
        assignee,
    })
    .await
}

fn require_admin(actor: &Actor) -> Result<()> {
    if !actor.role.is_admin() {
        bail!("Statistics are available to administrators only");
    }
    Ok(())
}

pub async fn cmd_stats(config: &DeskConfig, user: Option<&str>) -> Result<()> {
    let db = open_db(config)?;
    let actor = resolve_actor(&db, user).await?;
    require_admin(&actor)?;

    let (tickets, categories) = db
        .call(|db| Ok((db.query_tickets(&Scope::All)?, db.list_categories()?)))
        .await?;
    let stats = TicketStats::compute(&tickets, &categories);

    println!("Total tickets: {}", stats.total);
    for s in &stats.by_status {
        println!("  {:<12} {}", s.status.title(), s.count);
    }
    println!("Average resolution: {:.1} h", stats.avg_resolution_hours);
    if !stats.by_category.is_empty() {
        println!("By category:");
        for c in &stats.by_category {
            println!("  {:<24} {}", c.name, c.count);
        }
    }
    if !stats.by_priority.is_empty() {
        println!("By priority:");
        for p in &stats.by_priority {
            println!("  {:<12} {}", p.name, p.count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brodesk_common::{CategoryId, TicketId, UserId};
    use chrono::Utc;

    fn ticket(number: u64) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: TicketId::new(),
            number,
            title: format!("Ticket {}", number),
            description: "d".into(),
            location: None,
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
            reporter_name: Some("Sam".into()),
            category_name: None,
            team_name: None,
        }
    }

    #[test]
    fn test_find_ticket_by_number_forms() {
        let tickets = vec![ticket(7), ticket(42)];
        assert_eq!(find_ticket(&tickets, "TKT-00042").unwrap().number, 42);
        assert_eq!(find_ticket(&tickets, "tkt-00007").unwrap().number, 7);
        assert_eq!(find_ticket(&tickets, "42").unwrap().number, 42);
        let id = tickets[0].id.to_string();
        assert_eq!(find_ticket(&tickets, &id).unwrap().number, 7);
        assert!(find_ticket(&tickets, "TKT-00099").is_none());
    }

    #[test]
    fn test_render_board_lists_cards_under_columns() {
        let admin = Actor::new(UserId::new(), brodesk_common::Role::Admin, None);
        let board = BoardView::build(&admin, &[ticket(3)]);
        let text = render_board(&board);
        assert!(text.starts_with("Open (1)\n  TKT-00003"));
        assert!(text.contains("-> start_working"));
        assert!(text.contains("Closed (0)"));
    }
}
