/// Prefix lifecycle states for the crawl frontier
///
/// This module defines every state a search prefix can be in between seeding
/// (or expansion) and the end of its drain.
use std::fmt;

/// Represents the current state of a prefix in the crawl frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixState {
    // ===== Active States =====
    /// Prefix is waiting in the frontier queue
    Queued,

    /// Prefix has been handed to a worker and is being drained
    InFlight,

    // ===== Terminal Success States =====
    /// Prefix was fully drained and its result set was judged complete
    Completed,

    /// Prefix was fully drained, judged truncated, and split into children
    Expanded,

    // ===== Terminal Error States =====
    /// Prefix drain ended with an error; it is not retried or expanded
    Failed,
}

impl PrefixState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the prefix may still be dispatched or is being drained
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    /// Returns true if the prefix drained without error
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Expanded)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Checks whether the frontier may move a prefix from `self` to `next`
    ///
    /// `Queued -> InFlight -> {Completed, Expanded, Failed}` is the only path.
    pub fn can_transition_to(&self, next: PrefixState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InFlight)
                | (Self::InFlight, Self::Completed)
                | (Self::InFlight, Self::Expanded)
                | (Self::InFlight, Self::Failed)
        )
    }

    /// Converts the prefix state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Expanded => "expanded",
            Self::Failed => "failed",
        }
    }

    /// Parses a prefix state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "in_flight" => Some(Self::InFlight),
            "completed" => Some(Self::Completed),
            "expanded" => Some(Self::Expanded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible prefix states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::InFlight,
            Self::Completed,
            Self::Expanded,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PrefixState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
