//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                        |
//! |-----------|---------------------------------------------------------|
//! | `setup`   | `Init`, `Config`, `User`, `Team`, `Category`            |
//! | `serve`   | `Serve`                                                 |
//! | `tickets` | `Submit`, `Board`, `Move`, `Act`, `Priority`, `Assign`, `Stats` |

pub mod serve;
pub mod setup;
pub mod tickets;

use anyhow::{Context, Result, bail};
use brodesk::config::DeskConfig;
use brodesk::desk::db::{DbHandle, DeskDb};
use brodesk::desk::identity::DbIdentity;
use brodesk_common::{Actor, Team};

pub use serve::cmd_serve;
pub use setup::{cmd_category, cmd_config, cmd_init, cmd_team, cmd_user};
pub use tickets::{
    Submission, cmd_act, cmd_assign, cmd_board, cmd_move, cmd_priority, cmd_stats, cmd_submit,
};

pub fn init_logging(config: &DeskConfig, verbose: bool) -> Result<()> {
    let mut logging = config.toml.logging.clone();
    if verbose {
        logging.filter = "brodesk=debug,tower_http=debug".to_string();
    }
    brodesk::logging::init(&logging)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(())
}

/// Open the database of an initialized data directory.
pub fn open_db(config: &DeskConfig) -> Result<DbHandle> {
    let path = config.db_path();
    if !path.exists() {
        bail!(
            "No BroDesk database at {}. Run 'brodesk init' first.",
            path.display()
        );
    }
    let db = DeskDb::new(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(DbHandle::new(db))
}

pub async fn resolve_actor(db: &DbHandle, user: Option<&str>) -> Result<Actor> {
    let Some(user) = user else {
        bail!("No acting user. Pass --as <email> or set BRODESK_USER.");
    };
    DbIdentity::lookup(db, user)
        .await
        .with_context(|| format!("Unknown user '{}'", user))
}

pub async fn team_by_name(db: &DbHandle, name: &str) -> Result<Team> {
    let teams = db.call(|db| db.list_teams()).await?;
    teams
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
        .with_context(|| format!("Unknown team '{}'", name))
}
