//! Authorization tiers and the capability lookup consumed by the engine.
//!
//! The engine never stores roles or permissions itself. Every check goes
//! through [`AuthorizationProvider`], a single seam an identity system
//! implements: what tier does this user hold, and who holds at least a given
//! tier (the latter feeds the notification planner's recipient sets).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::request::UserId;

// ============================================================================
// Tier
// ============================================================================

/// Authorization level of an acting user, ordered by privilege.
///
/// The derived `Ord` gives `User < Supervisor < Administrator`, which is the
/// whole tier lattice: an administrator may do anything a supervisor may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    User,
    Supervisor,
    Administrator,
}

impl Tier {
    /// Returns true if this tier meets or exceeds `other`.
    #[must_use]
    pub fn at_least(&self, other: Tier) -> bool {
        *self >= other
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Supervisor => write!(f, "supervisor"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

// ============================================================================
// AuthorizationProvider
// ============================================================================

/// Errors from the authorization backend.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// The user is unknown to the identity system.
    #[error("user '{user_id}' not found")]
    UnknownUser {
        /// The user that was looked up
        user_id: UserId,
    },

    /// The backend could not be reached.
    #[error("authorization backend unavailable: {details}")]
    Unavailable {
        /// What failed
        details: String,
    },
}

/// Capability lookup backed by the external role/permission system.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// The tier the given user holds.
    async fn tier_of(&self, user_id: &UserId) -> Result<Tier, AuthzError>;

    /// All users holding at least the given tier.
    ///
    /// Used to compute notification recipient sets; ordering is not
    /// significant.
    async fn users_with_tier_at_least(&self, tier: Tier) -> Result<Vec<UserId>, AuthzError>;
}

// ============================================================================
// StaticRoster
// ============================================================================

/// Fixed in-memory user/tier roster.
///
/// Suitable for tests and single-node deployments where the roster is loaded
/// once at startup. Unknown users resolve to [`Tier::User`] rather than
/// erroring, matching how the external system treats authenticated users
/// without an elevated role.
#[derive(Debug, Default)]
pub struct StaticRoster {
    tiers: DashMap<UserId, Tier>,
}

impl StaticRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a tier to a user, replacing any previous assignment.
    pub fn assign(&self, user_id: UserId, tier: Tier) {
        self.tiers.insert(user_id, tier);
    }
}

#[async_trait]
impl AuthorizationProvider for StaticRoster {
    async fn tier_of(&self, user_id: &UserId) -> Result<Tier, AuthzError> {
        Ok(self
            .tiers
            .get(user_id)
            .map(|t| *t)
            .unwrap_or(Tier::User))
    }

    async fn users_with_tier_at_least(&self, tier: Tier) -> Result<Vec<UserId>, AuthzError> {
        Ok(self
            .tiers
            .iter()
            .filter(|entry| entry.value().at_least(tier))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering() {
        assert!(Tier::Administrator.at_least(Tier::Supervisor));
        assert!(Tier::Administrator.at_least(Tier::Administrator));
        assert!(Tier::Supervisor.at_least(Tier::User));
        assert!(!Tier::Supervisor.at_least(Tier::Administrator));
        assert!(!Tier::User.at_least(Tier::Supervisor));
    }

    #[tokio::test]
    async fn roster_lookup_and_listing() {
        let roster = StaticRoster::new();
        roster.assign(UserId::new("alice"), Tier::Administrator);
        roster.assign(UserId::new("bob"), Tier::Supervisor);
        roster.assign(UserId::new("carol"), Tier::User);

        assert_eq!(
            roster.tier_of(&UserId::new("alice")).await.unwrap(),
            Tier::Administrator
        );
        // Unknown users default to the base tier
        assert_eq!(
            roster.tier_of(&UserId::new("nobody")).await.unwrap(),
            Tier::User
        );

        let mut supers = roster
            .users_with_tier_at_least(Tier::Supervisor)
            .await
            .unwrap();
        supers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(supers, vec![UserId::new("alice"), UserId::new("bob")]);

        let admins = roster
            .users_with_tier_at_least(Tier::Administrator)
            .await
            .unwrap();
        assert_eq!(admins, vec![UserId::new("alice")]);
    }
}
