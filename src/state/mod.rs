//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PrefixState`: lifecycle of a prefix in the frontier (queued, in flight, completed, ...)
//! - `SessionState`: per-worker session bookkeeping (token, request pacing)
//! - `DetailNavigator`: ordered navigation through a record's detail tabs

mod detail_state;
mod prefix_state;
mod session_state;

// Re-export main types
pub use detail_state::{DetailNavigator, DetailStep, DetailTab, NavigationError};
pub use prefix_state::PrefixState;
pub use session_state::SessionState;
