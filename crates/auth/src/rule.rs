//! Authorization rules.

use std::str::FromStr;

use common::{Role, UserId};

use crate::{AuthError, Claims};

/// A named authorization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Any authenticated user or admin.
    Any,
    Admin,
    User,
    /// The caller owns the resource.
    Owner,
    AdminOrOwner,
}

impl Rule {
    pub const ALL: [Rule; 5] = [
        Rule::Any,
        Rule::Admin,
        Rule::User,
        Rule::Owner,
        Rule::AdminOrOwner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Any => "rule_any",
            Rule::Admin => "rule_admin_only",
            Rule::User => "rule_user_only",
            Rule::Owner => "rule_owner",
            Rule::AdminOrOwner => "rule_admin_or_owner",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rule {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s)
            .ok_or_else(|| AuthError::UnknownRule(s.to_string()))
    }
}

/// Evaluates `rule` for the caller described by `claims`.
///
/// `owner` is the user owning the resource being acted on, if any. Owner
/// rules fail when it is absent.
pub fn authorize(claims: &Claims, owner: Option<UserId>, rule: Rule) -> Result<(), AuthError> {
    let is_owner = || match (claims.subject(), owner) {
        (Ok(subject), Some(owner)) => subject == owner,
        _ => false,
    };

    let allowed = match rule {
        Rule::Any => claims.has_role(Role::Admin) || claims.has_role(Role::User),
        Rule::Admin => claims.has_role(Role::Admin),
        Rule::User => claims.has_role(Role::User),
        Rule::Owner => is_owner(),
        Rule::AdminOrOwner => claims.has_role(Role::Admin) || is_owner(),
    };

    if allowed {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            rule: rule.as_str(),
        })
    }
}
