//! Error taxonomy shared by every layer.

/// Coarse classification of a failure.
///
/// Each crate's error type maps onto one of these kinds; the HTTP layer
/// turns the kind into a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, unknown sort field, unknown rule.
    InvalidArgument,
    /// Order or product absent.
    NotFound,
    /// Concurrent status change, duplicate line item, disallowed state.
    Conflict,
    /// Requested quantity exceeds on-hand stock.
    InsufficientStock,
    /// Token invalid or expired, account disabled or unconfirmed.
    Unauthenticated,
    /// Rule evaluation failed.
    PermissionDenied,
    /// The caller-supplied deadline expired mid-transaction.
    DeadlineExceeded,
    /// Storage or transport failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}
