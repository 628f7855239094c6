use common::ErrorKind;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while authenticating or authorizing a caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("expected authorization header format: Bearer <token>")]
    MissingBearer,

    /// The token is malformed, expired, from another issuer or badly signed.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("kid missing from token header")]
    MissingKeyId,

    #[error("unknown key id {0:?}")]
    UnknownKey(String),

    /// The key exists but has no private half to sign with.
    #[error("no private key for key id {0:?}")]
    NoSigningKey(String),

    #[error("invalid token subject {0:?}")]
    InvalidSubject(String),

    #[error("user no longer exists")]
    UserNotFound,

    #[error("user disabled")]
    UserDisabled,

    #[error("user has not confirmed their email")]
    EmailUnconfirmed,

    #[error("unknown rule {0:?}")]
    UnknownRule(String),

    /// Rule evaluation failed. The message never names the resource.
    #[error("attempted action is not allowed")]
    Forbidden { rule: &'static str },

    #[error("invalid key material for {kid}: {reason}")]
    Key { kid: String, reason: String },

    #[error("reading keys from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Maps this error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingBearer
            | AuthError::InvalidToken(_)
            | AuthError::MissingKeyId
            | AuthError::UnknownKey(_)
            | AuthError::InvalidSubject(_)
            | AuthError::UserNotFound
            | AuthError::UserDisabled
            | AuthError::EmailUnconfirmed => ErrorKind::Unauthenticated,
            AuthError::UnknownRule(_) => ErrorKind::InvalidArgument,
            AuthError::Forbidden { .. } => ErrorKind::PermissionDenied,
            AuthError::NoSigningKey(_)
            | AuthError::Key { .. }
            | AuthError::Io { .. }
            | AuthError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Short label used for the `auth_failures_total` metric.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingBearer => "missing_bearer",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::MissingKeyId | AuthError::UnknownKey(_) => "unknown_key",
            AuthError::InvalidSubject(_) => "invalid_subject",
            AuthError::UserNotFound => "user_not_found",
            AuthError::UserDisabled => "user_disabled",
            AuthError::EmailUnconfirmed => "email_unconfirmed",
            AuthError::UnknownRule(_) => "unknown_rule",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::NoSigningKey(_)
            | AuthError::Key { .. }
            | AuthError::Io { .. }
            | AuthError::Store(_) => "internal",
        }
    }
}
