use anyhow::Result;
use brodesk::config::{DEFAULT_DATA_DIR, DeskConfig};
use brodesk::desk::lifecycle::QuickAction;
use brodesk_common::{Priority, Role, TicketStatus};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "brodesk")]
#[command(version, about = "Role-based ticket desk with a live kanban board")]
pub struct Cli {
    /// Data directory holding brodesk.toml and the database
    #[arg(long, global = true, env = "BRODESK_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Acting user (id or email)
    #[arg(long = "as", global = true, env = "BRODESK_USER")]
    pub user: Option<String>,

    /// Debug logging (overrides the configured filter)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory, default config and database
    Init,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage teams
    Team {
        #[command(subcommand)]
        command: TeamCommands,
    },
    /// Manage ticket categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Run the HTTP service and change-feed WebSocket
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Permissive CORS for a local front-end dev server
        #[arg(long)]
        dev: bool,
    },
    /// Submit a ticket as the acting user
    Submit {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        /// Category name
        #[arg(long)]
        category: String,

        #[arg(long, default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        location: Option<String>,

        /// Hide the reporter's name from other non-staff viewers
        #[arg(long)]
        anonymous: bool,
    },
    /// Show the acting user's board
    Board {
        /// Print the board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a ticket to another column
    Move {
        /// Ticket number (TKT-00042 or 42) or id
        ticket: String,

        status: TicketStatus,

        /// Post this as a public comment with the status change
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Run a quick action (start, resolve, close, reopen)
    Act {
        ticket: String,

        action: QuickAction,
    },
    /// Change a ticket's priority
    Priority {
        ticket: String,

        priority: Priority,
    },
    /// Reassign a ticket to a team and/or user (admin only)
    Assign {
        ticket: String,

        /// Team name; omit to clear
        #[arg(long)]
        team: Option<String>,

        /// Assignee id or email; omit to clear
        #[arg(long = "user")]
        assignee: Option<String>,
    },
    /// Ticket statistics (admin only)
    Stats,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, default_value = "student")]
        role: Role,

        /// Team name
        #[arg(long)]
        team: Option<String>,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
pub enum TeamCommands {
    Add {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    Add {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Team that receives tickets in this category
        #[arg(long)]
        team: Option<String>,
    },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DeskConfig::load(cli.data_dir.clone())?;
    cmd::init_logging(&config, cli.verbose)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
        Commands::User { command } => cmd::cmd_user(&config, command).await?,
        Commands::Team { command } => cmd::cmd_team(&config, command).await?,
        Commands::Category { command } => cmd::cmd_category(&config, command).await?,
        Commands::Serve { port, host, dev } => {
            cmd::cmd_serve(&config, *port, host.clone(), *dev).await?
        }
        Commands::Submit {
            title,
            description,
            category,
            priority,
            location,
            anonymous,
        } => {
            let submission = cmd::Submission {
                title: title.clone(),
                description: description.clone(),
                category: category.clone(),
                priority: *priority,
                location: location.clone(),
                anonymous: *anonymous,
            };
            cmd::cmd_submit(&config, cli.user.as_deref(), submission).await?
        }
        Commands::Board { json } => cmd::cmd_board(&config, cli.user.as_deref(), *json).await?,
        Commands::Move {
            ticket,
            status,
            message,
        } => {
            cmd::cmd_move(&config, cli.user.as_deref(), ticket, *status, message.clone()).await?
        }
        Commands::Act { ticket, action } => {
            cmd::cmd_act(&config, cli.user.as_deref(), ticket, *action).await?
        }
        Commands::Priority { ticket, priority } => {
            cmd::cmd_priority(&config, cli.user.as_deref(), ticket, *priority).await?
        }
        Commands::Assign {
            ticket,
            team,
            assignee,
        } => {
            cmd::cmd_assign(
                &config,
                cli.user.as_deref(),
                ticket,
                team.as_deref(),
                assignee.as_deref(),
            )
            .await?
        }
        Commands::Stats => cmd::cmd_stats(&config, cli.user.as_deref()).await?,
    }

    Ok(())
}
