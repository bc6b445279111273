//! Data directory setup and reference data: `brodesk init`, `config`,
//! `user`, `team`, `category`.

use anyhow::{Context, Result};
use brodesk::config::{CONFIG_FILE, DeskConfig, DeskToml};
use brodesk::desk::db::DeskDb;
use brodesk::desk::notify;
use brodesk_common::NewUser;

use super::super::{CategoryCommands, ConfigCommands, TeamCommands, UserCommands};
use super::{open_db, team_by_name};

pub fn cmd_init(config: &DeskConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    let config_path = config.config_file();
    if config_path.exists() {
        println!("Keeping existing {}", config_path.display());
    } else {
        DeskToml::default().save(&config_path)?;
        println!("Wrote {}", config_path.display());
    }

    let db_path = config.db_path();
    DeskDb::new(&db_path)?;
    println!("Database ready at {}", db_path.display());
    println!();
    println!("Next: brodesk user add --name <name> --email <email> --role super_admin");
    Ok(())
}

pub fn cmd_config(config: &DeskConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config_path = config.config_file();
            if config_path.exists() {
                println!("# {}", config_path.display());
            } else {
                println!("# no {} in {}; defaults", CONFIG_FILE, config.data_dir.display());
            }
            println!("# effective values, environment overrides applied");
            println!();
            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}

pub async fn cmd_user(config: &DeskConfig, command: &UserCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        UserCommands::Add {
            name,
            email,
            role,
            team,
        } => {
            let team_id = match team {
                Some(name) => Some(team_by_name(&db, name).await?.id),
                None => None,
            };
            let user = NewUser {
                full_name: name.clone(),
                email: email.clone(),
                role: *role,
                team_id,
            };
            let profile = db.call(move |db| db.create_user(&user)).await?;
            println!(
                "Created {} {} <{}> ({})",
                profile.role, profile.full_name, profile.email, profile.id
            );

            let sink = notify::sink_from_config(&config.toml.notifications, Some(db.clone()))?;
            for failure in notify::dispatch(
                sink.as_ref(),
                vec![notify::user_created_notification(&profile)],
            )
            .await
            {
                eprintln!("warning: welcome notification not sent: {}", failure);
            }
        }
        UserCommands::List => {
            let profiles = db.call(|db| db.list_profiles()).await?;
            if profiles.is_empty() {
                println!("No users.");
            }
            for p in profiles {
                println!("{:<12} {:<28} {}", p.role.as_str(), p.email, p.full_name);
            }
        }
    }
    Ok(())
}

pub async fn cmd_team(config: &DeskConfig, command: &TeamCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        TeamCommands::Add { name, description } => {
            let (name, description) = (name.clone(), description.clone());
            let team = db
                .call(move |db| db.create_team(&name, description.as_deref()))
                .await?;
            println!("Created team {} ({})", team.name, team.id);
        }
        TeamCommands::List => {
            for team in db.call(|db| db.list_teams()).await? {
                println!("{}", team.name);
            }
        }
    }
    Ok(())
}

pub async fn cmd_category(config: &DeskConfig, command: &CategoryCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        CategoryCommands::Add {
            name,
            description,
            team,
        } => {
            let team = match team {
                Some(team) => Some(team_by_name(&db, team).await?),
                None => None,
            };
            let team_id = team.as_ref().map(|t| t.id);
            let (name, description) = (name.clone(), description.clone());
            let category = db
                .call(move |db| db.create_category(&name, description.as_deref(), team_id))
                .await?;
            match team {
                Some(team) => println!("Created category {} routed to {}", category.name, team.name),
                None => println!("Created category {}", category.name),
            }
        }
        CategoryCommands::List => {
            let teams = db.call(|db| db.list_teams()).await?;
            for category in db.call(|db| db.list_categories()).await? {
                let team = category
                    .team_id
                    .and_then(|id| teams.iter().find(|t| t.id == id))
                    .map_or("-", |t| t.name.as_str());
                println!("{:<24} {}", category.name, team);
            }
        }
    }
    Ok(())
}
