use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{ErrorKind, OrderStatus, UserId};
use thiserror::Error;

/// Errors produced while parsing query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown sort field: {0}")]
    InvalidSortField(String),

    #[error("unknown sort direction: {0}")]
    InvalidSortDirection(String),

    #[error("invalid page: {0}")]
    InvalidPage(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

/// Builder for filtering orders.
///
/// All set criteria must match; date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Orders created at or after this instant.
    pub start_created_date: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub end_created_date: Option<DateTime<Utc>>,

    /// Orders owned by this user.
    pub user_id: Option<UserId>,

    /// Orders currently in this status.
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter for a specific owner.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn start_created_date(mut self, at: DateTime<Utc>) -> Self {
        self.start_created_date = Some(at);
        self
    }

    pub fn end_created_date(mut self, at: DateTime<Utc>) -> Self {
        self.end_created_date = Some(at);
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Fields orders can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    DateCreated,
    Amount,
    Status,
}

impl SortField {
    /// Returns the external (and column) name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::DateCreated => "date_created",
            SortField::Amount => "amount",
            SortField::Status => "status",
        }
    }
}

impl FromStr for SortField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date_created" => Ok(SortField::DateCreated),
            "amount" => Ok(SortField::Amount),
            "status" => Ok(SortField::Status),
            other => Err(QueryError::InvalidSortField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(QueryError::InvalidSortDirection(s.to_string())),
        }
    }
}

/// Sort order for order listings. Defaults to newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: SortField,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Parses `field[,direction]`. An absent or blank value yields the default;
    /// a field without a direction sorts ascending.
    pub fn parse(input: Option<&str>) -> Result<Self, QueryError> {
        let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };

        let mut parts = raw.split(',').map(str::trim);
        let field = parts.next().unwrap_or_default().parse::<SortField>()?;
        let direction = match parts.next() {
            Some(direction) => direction.parse::<SortDirection>()?,
            None => SortDirection::Asc,
        };

        if parts.next().is_some() {
            return Err(QueryError::InvalidSortField(raw.to_string()));
        }

        Ok(Self { field, direction })
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: SortField::DateCreated,
            direction: SortDirection::Desc,
        }
    }
}

/// A page of results, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    rows_per_page: u32,
}

impl Page {
    pub const DEFAULT_ROWS: u32 = 10;
    pub const MAX_ROWS: u32 = 100;

    /// Creates a page, validating both bounds.
    pub fn new(number: u32, rows_per_page: u32) -> Result<Self, QueryError> {
        if number == 0 {
            return Err(QueryError::InvalidPage(
                "page number must be at least 1".to_string(),
            ));
        }
        if rows_per_page == 0 || rows_per_page > Self::MAX_ROWS {
            return Err(QueryError::InvalidPage(format!(
                "rows per page must be between 1 and {}",
                Self::MAX_ROWS
            )));
        }
        Ok(Self {
            number,
            rows_per_page,
        })
    }

    /// Parses optional `page` and `rows` query values.
    pub fn parse(number: Option<&str>, rows: Option<&str>) -> Result<Self, QueryError> {
        let number = parse_positive(number, 1)?;
        let rows = parse_positive(rows, Self::DEFAULT_ROWS)?;
        Self::new(number, rows)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn rows_per_page(&self) -> u32 {
        self.rows_per_page
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.rows_per_page)
    }

    /// Maximum number of rows to return.
    pub fn limit(&self) -> u64 {
        u64::from(self.rows_per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            rows_per_page: Self::DEFAULT_ROWS,
        }
    }
}

fn parse_positive(value: Option<&str>, default: u32) -> Result<u32, QueryError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|e| QueryError::InvalidPage(format!("{raw}: {e}"))),
    }
}
