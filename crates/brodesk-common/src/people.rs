use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, TeamId, UserId};

/// Application role. `Student` is the reporting user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    TeamMember,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::TeamMember => "team_member",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Team members and administrators: the roles that work tickets.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Self::Student)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "team_member" => Ok(Self::TeamMember),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The authenticated user acting on the desk, as resolved by an identity
/// provider at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(id: UserId, role: Role, team_id: Option<TeamId>) -> Self {
        Self {
            id,
            role,
            team_id,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            team_id: self.team_id,
            display_name: Some(self.full_name.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub team_id: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ticket category. `team_id` is the routing target for new tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
}
