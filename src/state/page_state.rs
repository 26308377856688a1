/// Page outcome definitions for completed pages
///
/// Every page that leaves the in-flight set ends in exactly one of these
/// states. They are what the pages table stores and what `--stats` counts.
use crate::crawler::FetchStatus;
use std::fmt;

/// Final outcome of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Success States =====
    /// Page was fetched and yielded at least one record
    Processed,

    /// Page was fetched but matched no records; its branch stops here
    Exhausted,

    // ===== Error States =====
    /// Page returned a permanent 4xx
    DeadLink,

    /// Page could not be reached (timeout, connection or body error)
    Unreachable,

    /// Retries ran out on HTTP 429
    RateLimited,

    /// Retries ran out on a 5xx
    ServerError,

    /// robots.txt forbids the page
    Disallowed,
}

impl PageState {
    /// Derives the state from a fetch status and the number of records extracted
    pub fn from_outcome(status: &FetchStatus, record_count: usize) -> Self {
        match status {
            FetchStatus::Success if record_count > 0 => Self::Processed,
            FetchStatus::Success => Self::Exhausted,
            FetchStatus::HttpError(429) => Self::RateLimited,
            FetchStatus::HttpError(code) if *code >= 500 => Self::ServerError,
            FetchStatus::HttpError(_) => Self::DeadLink,
            FetchStatus::Timeout | FetchStatus::NetworkError(_) => Self::Unreachable,
            FetchStatus::Disallowed => Self::Disallowed,
        }
    }

    /// Returns true if the page was fetched successfully
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Processed | Self::Exhausted)
    }

    /// Returns true if this represents a failed page
    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Converts the page state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Exhausted => "exhausted",
            Self::DeadLink => "dead_link",
            Self::Unreachable => "unreachable",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Disallowed => "disallowed",
        }
    }

    /// Parses a page state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(Self::Processed),
            "exhausted" => Some(Self::Exhausted),
            "dead_link" => Some(Self::DeadLink),
            "unreachable" => Some(Self::Unreachable),
            "rate_limited" => Some(Self::RateLimited),
            "server_error" => Some(Self::ServerError),
            "disallowed" => Some(Self::Disallowed),
            _ => None,
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Processed,
            Self::Exhausted,
            Self::DeadLink,
            Self::Unreachable,
            Self::RateLimited,
            Self::ServerError,
            Self::Disallowed,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
