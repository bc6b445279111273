//! Role-scoped visibility: which tickets an actor may see, and how the
//! reporter and comments of a visible ticket are presented to them.

use brodesk_common::{Actor, Comment, Role, TeamId, Ticket, UserId};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_LABEL: &str = "Anonymous";

/// The ticket population an actor may see on their board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    All,
    Team(TeamId),
    Reporter(UserId),
}

impl Scope {
    /// First match wins: admins see everything, a team member with a team
    /// sees that team's tickets, everyone else sees what they reported.
    pub fn for_actor(actor: &Actor) -> Self {
        match (actor.role, actor.team_id) {
            (Role::SuperAdmin | Role::Admin, _) => Self::All,
            (Role::TeamMember, Some(team)) => Self::Team(team),
            (Role::TeamMember, None) | (Role::Student, _) => Self::Reporter(actor.id),
        }
    }

    pub fn admits(&self, ticket: &Ticket) -> bool {
        match self {
            Self::All => true,
            Self::Team(team) => ticket.team_id == Some(*team),
            Self::Reporter(user) => ticket.reporter_id == *user,
        }
    }

    /// Keep only the tickets this scope admits.
    pub fn filter(&self, tickets: Vec<Ticket>) -> Vec<Ticket> {
        tickets.into_iter().filter(|t| self.admits(t)).collect()
    }
}

/// Name shown for the reporter of `ticket` to `viewer`.
///
/// Anonymous tickets hide the reporter from viewers who are neither staff
/// nor the reporter themself.
pub fn reporter_label(viewer: &Actor, ticket: &Ticket) -> String {
    let hidden =
        ticket.is_anonymous && !viewer.role.is_staff() && viewer.id != ticket.reporter_id;
    if hidden {
        return ANONYMOUS_LABEL.to_string();
    }
    ticket
        .reporter_name
        .clone()
        .unwrap_or_else(|| ticket.reporter_id.to_string())
}

/// Internal comments are staff-only.
pub fn comment_visible(viewer: &Actor, comment: &Comment) -> bool {
    !comment.is_internal || viewer.role.is_staff()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::testing::ticket_fixture;
    use brodesk_common::CommentId;
    use chrono::Utc;
    use proptest::prelude::*;

    fn actor(role: Role, team: Option<TeamId>) -> Actor {
        Actor::new(UserId::new(), role, team)
    }

    #[test]
    fn test_scope_precedence() {
        let team = TeamId::new();
        assert_eq!(Scope::for_actor(&actor(Role::SuperAdmin, Some(team))), Scope::All);
        assert_eq!(Scope::for_actor(&actor(Role::Admin, None)), Scope::All);
        assert_eq!(
            Scope::for_actor(&actor(Role::TeamMember, Some(team))),
            Scope::Team(team)
        );

        let lone = actor(Role::TeamMember, None);
        assert_eq!(Scope::for_actor(&lone), Scope::Reporter(lone.id));

        // A student with a team is still scoped to their own tickets.
        let student = actor(Role::Student, Some(team));
        assert_eq!(Scope::for_actor(&student), Scope::Reporter(student.id));
    }

    #[test]
    fn test_filter_drops_out_of_scope_tickets() {
        let t1 = TeamId::new();
        let mut mine = ticket_fixture();
        mine.team_id = Some(t1);
        let mut other = ticket_fixture();
        other.team_id = Some(TeamId::new());
        let unassigned = ticket_fixture();

        let visible = Scope::Team(t1).filter(vec![mine.clone(), other, unassigned]);
        assert_eq!(visible, vec![mine]);
    }

    #[test]
    fn test_reporter_label_hides_anonymous_from_peers() {
        let mut ticket = ticket_fixture();
        ticket.is_anonymous = true;
        ticket.reporter_name = Some("Ada".to_string());

        let peer = actor(Role::Student, None);
        assert_eq!(reporter_label(&peer, &ticket), ANONYMOUS_LABEL);

        let staff = actor(Role::TeamMember, None);
        assert_eq!(reporter_label(&staff, &ticket), "Ada");

        let reporter = Actor::new(ticket.reporter_id, Role::Student, None);
        assert_eq!(reporter_label(&reporter, &ticket), "Ada");
    }

    #[test]
    fn test_internal_comments_are_staff_only() {
        let comment = Comment {
            id: CommentId::new(),
            ticket_id: ticket_fixture().id,
            author_id: UserId::new(),
            message: "checked the breaker".to_string(),
            is_internal: true,
            created_at: Utc::now(),
            author_name: None,
        };
        assert!(!comment_visible(&actor(Role::Student, None), &comment));
        assert!(comment_visible(&actor(Role::Admin, None), &comment));
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Student),
            Just(Role::TeamMember),
            Just(Role::Admin),
            Just(Role::SuperAdmin),
        ]
    }

    proptest! {
        /// Identities are drawn from a pool of two so collisions are common.
        #[test]
        fn prop_scope_matches_role_rule(
            role in role_strategy(),
            actor_team in proptest::option::of(0usize..2),
            actor_is_reporter in any::<bool>(),
            ticket_team in proptest::option::of(0usize..2),
        ) {
            let teams = [TeamId::new(), TeamId::new()];
            let viewer = actor(role, actor_team.map(|i| teams[i]));

            let mut ticket = ticket_fixture();
            ticket.team_id = ticket_team.map(|i| teams[i]);
            if actor_is_reporter {
                ticket.reporter_id = viewer.id;
            }

            let expected = match role {
                Role::Admin | Role::SuperAdmin => true,
                Role::TeamMember if actor_team.is_some() => {
                    ticket_team.is_some() && ticket_team == actor_team
                }
                _ => actor_is_reporter,
            };

            let scope = Scope::for_actor(&viewer);
            prop_assert_eq!(scope.admits(&ticket), expected);
            prop_assert_eq!(scope.filter(vec![ticket]).len(), usize::from(expected));
        }
    }
}
