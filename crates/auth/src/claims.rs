//! Token claims.

use chrono::{DateTime, Duration, Utc};
use common::{Role, UserId};
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Identity and role facts carried by a signed token.
///
/// Valid only for the request that presented the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The user id, as a UUID string.
    pub sub: String,
    pub iss: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issued at, seconds since the Unix epoch.
    pub iat: i64,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Claims {
    /// Creates claims for `user_id` valid for `ttl` from `now`.
    pub fn new(
        user_id: UserId,
        issuer: impl Into<String>,
        roles: Vec<Role>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            iss: issuer.into(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            roles,
        }
    }

    /// Parses the subject as a user id.
    pub fn subject(&self) -> Result<UserId, AuthError> {
        UserId::parse_str(&self.sub).map_err(|_| AuthError::InvalidSubject(self.sub.clone()))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
