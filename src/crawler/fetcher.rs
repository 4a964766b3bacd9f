//! Fetcher contract between the crawl core and the directory site
//!
//! A [`Fetcher`] is one worker's session with the site. It submits a prefix
//! search, pages through the result list, and walks a record's detail tabs.
//! Everything above this trait treats its errors as terminal for the call.

use crate::prefix::Prefix;
use crate::state::{DetailNavigator, DetailTab, NavigationError};
use thiserror::Error;

/// Errors a fetcher can report
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("Detail navigation error: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Session setup failed: {0}")]
    Session(String),
}

impl FetchError {
    /// Returns true for failures that might succeed if tried again later
    ///
    /// Advisory only; the crawl core never retries.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// One result card from a search result page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    /// Stable natural identifier (registry number)
    pub identity: String,
    pub name: String,
    pub profession: Option<String>,
    pub organization: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Query parameters of the card's detail link, needed to open the record
    pub detail_params: Vec<(String, String)>,
}

/// Outcome of requesting one result page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Records(Vec<RecordSummary>),
    EndOfResults,
}

/// An open search for one prefix
#[derive(Debug, Clone)]
pub struct SearchHandle {
    pub prefix: Prefix,
    /// Page 1, when the search response already carried it
    pub first_page: Option<Vec<RecordSummary>>,
}

impl SearchHandle {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            first_page: None,
        }
    }
}

/// An opened detail view of one record
///
/// Carries the navigator so tabs can only be fetched in portal order.
#[derive(Debug, Clone)]
pub struct DetailContext {
    pub identity: String,
    pub params: Vec<(String, String)>,
    navigator: DetailNavigator,
}

impl DetailContext {
    /// Builds the context for a record whose detail view was just opened
    pub fn opened(record: &RecordSummary) -> Result<Self, NavigationError> {
        let mut navigator = DetailNavigator::new();
        navigator.open()?;
        Ok(Self {
            identity: record.identity.clone(),
            params: record.detail_params.clone(),
            navigator,
        })
    }

    /// The tab the portal expects next
    pub fn next_tab(&self) -> Option<DetailTab> {
        self.navigator.next_tab()
    }

    /// Fails unless `tab` is the tab the portal expects next
    pub fn ensure_next(&self, tab: DetailTab) -> Result<(), NavigationError> {
        let expected = self.navigator.next_tab();
        if expected == Some(tab) {
            Ok(())
        } else {
            Err(NavigationError::OutOfOrder { expected, got: tab })
        }
    }

    /// Marks `tab` as visited
    pub fn advance(&mut self, tab: DetailTab) -> Result<(), NavigationError> {
        self.navigator.record(tab)
    }

    /// Closes the navigation after the last tab
    pub fn finish(&mut self) -> Result<(), NavigationError> {
        self.navigator.finish()
    }
}

/// One worker's session with the directory site
///
/// Implementations are owned by exactly one worker and never shared.
#[async_trait::async_trait]
pub trait Fetcher: Send {
    /// Identity of the underlying session (distinct per worker and per rebuild)
    fn session_id(&self) -> &str;

    /// Issues the search query for a prefix
    async fn submit_search(&mut self, prefix: &Prefix) -> Result<SearchHandle, FetchError>;

    /// Requests one result page (1-based); pages must be requested in order
    async fn fetch_page(
        &mut self,
        handle: &mut SearchHandle,
        page: u32,
    ) -> Result<PageOutcome, FetchError>;

    /// Opens a record's detail view
    async fn open_detail(&mut self, record: &RecordSummary) -> Result<DetailContext, FetchError>;

    /// Fetches the raw HTML of the next detail tab
    async fn fetch_tab(
        &mut self,
        context: &DetailContext,
        tab: DetailTab,
    ) -> Result<String, FetchError>;
}

/// Builds one isolated fetcher per worker
pub trait FetcherFactory: Send + Sync + 'static {
    type Fetcher: Fetcher + 'static;

    /// Creates a fresh session for `worker_id`
    ///
    /// `generation` counts how many sessions this worker has had; a worker
    /// rebuilds its session after a drain panics.
    fn create(&self, worker_id: u32, generation: u32) -> Result<Self::Fetcher, FetchError>;
}
