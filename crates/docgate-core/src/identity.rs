//! Authenticated principal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An authenticated account.
///
/// Set on the [`Exchange`](crate::Exchange) by the authentication handler.
/// Unauthenticated requests carry no account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    name: String,
    roles: BTreeSet<String>,
}

impl Account {
    /// Creates an account with the given name and roles.
    pub fn new<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the account roles.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Returns true if the account has the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_roles() {
        let account = Account::new("admin", ["admin", "user"]);
        assert_eq!(account.name(), "admin");
        assert!(account.has_role("admin"));
        assert!(!account.has_role("root"));
        assert_eq!(account.roles().len(), 2);
    }
}
