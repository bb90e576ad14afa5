//! Actors: the role identities a workflow authenticates as.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an actor in the ticketing application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Opens tickets
    #[default]
    Customer,
    /// Works tickets
    Agent,
    /// Manages users
    Admin,
}

impl Role {
    /// Value used by the application's role `<select>`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential/role pair. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
    /// Name shown in the UI
    pub display_name: String,
    /// Role
    #[serde(default)]
    pub role: Role,
}

impl Actor {
    /// Create an actor
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            display_name: display_name.into(),
            role,
        }
    }

    /// Default customer account used by the assignment scenario
    #[must_use]
    pub fn default_customer() -> Self {
        Self::new(
            "customer1@example.com",
            "Customer123!",
            "Test Customer",
            Role::Customer,
        )
    }

    /// Default agent account
    #[must_use]
    pub fn default_agent() -> Self {
        Self::new("agent1@example.com", "Agent123!", "Test Agent", Role::Agent)
    }

    /// Default administrator account
    #[must_use]
    pub fn default_admin() -> Self {
        Self::new("admin@example.com", "Admin1234!@#$", "Admin", Role::Admin)
    }
}

/// Part of an email address before `@`
#[must_use]
pub fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.role, self.email)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_local_part() {
        assert_eq!(local_part(&Actor::default_agent().email), "agent1");
        assert_eq!(local_part("no-at-sign"), "no-at-sign");
        assert_eq!(local_part(""), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(Actor::default_customer().to_string(), "customer <customer1@example.com>");
    }

    #[test]
    fn test_role_serde_lowercase() {
        let yaml = "email: a@b.c\npassword: p\ndisplay_name: A\nrole: agent\n";
        let actor: Actor = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(actor.role, Role::Agent);
    }

    #[test]
    fn test_role_defaults_to_customer() {
        let yaml = "email: a@b.c\npassword: p\ndisplay_name: A\n";
        let actor: Actor = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(actor.role, Role::Customer);
    }
}
