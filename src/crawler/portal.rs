//! HTTP fetcher for the directory portal
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building one HTTP client (and cookie jar) per worker session
//! - Reading the session token from the landing page, with one refresh on failure
//! - Submitting prefix searches and requesting result pages in order
//! - Opening detail views and fetching their tabs
//! - Pacing requests through the session's minimum interval
//! - Error classification

use crate::config::PortalConfig;
use crate::crawler::fetcher::{
    DetailContext, FetchError, Fetcher, FetcherFactory, PageOutcome, RecordSummary, SearchHandle,
};
use crate::crawler::parser::{extract_token, parse_result_cards};
use crate::prefix::Prefix;
use crate::state::{DetailTab, SessionState};
use regex::Regex;
use reqwest::{header, Client, RequestBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Builds the HTTP client for one worker session
///
/// Each client carries its own cookie store, so sessions never share portal state.
///
/// # Arguments
///
/// * `config` - The portal configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &PortalConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a reqwest failure onto the fetch error taxonomy
fn classify_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Http {
            status: status.as_u16(),
        }
    } else {
        FetchError::Network(err.to_string())
    }
}

/// A fetcher talking to the real portal over HTTP
pub struct HttpFetcher {
    client: Client,
    portal: Arc<PortalConfig>,
    base_url: Url,
    token_pattern: Regex,
    session: SessionState,
    min_interval: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher with a brand-new session
    pub fn new(
        portal: Arc<PortalConfig>,
        min_interval: Duration,
        session_id: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let client =
            build_http_client(&portal).map_err(|e| FetchError::Session(e.to_string()))?;
        let base_url = Url::parse(&portal.base_url)
            .map_err(|e| FetchError::Session(format!("invalid base url: {}", e)))?;
        let token_pattern = Regex::new(&portal.token_pattern)
            .map_err(|e| FetchError::Session(format!("invalid token pattern: {}", e)))?;

        Ok(Self {
            client,
            portal,
            base_url,
            token_pattern,
            session: SessionState::new(session_id),
            min_interval,
        })
    }

    /// Session bookkeeping (token, request count)
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Session(format!("invalid endpoint '{}': {}", path, e)))
    }

    /// Waits until the session may issue another request
    async fn throttle(&mut self) {
        if let Some(wait) = self
            .session
            .time_until_next_request(self.min_interval, Instant::now())
        {
            tokio::time::sleep(wait).await;
        }
        self.session.record_request(Instant::now());
    }

    /// Sends a request and returns the body of a successful response
    async fn send(&mut self, request: RequestBuilder) -> Result<String, FetchError> {
        self.throttle().await;

        let response = request.send().await.map_err(classify_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(classify_error)
    }

    /// Reads a fresh token from the landing page
    async fn acquire_token(&mut self) -> Result<String, FetchError> {
        let url = self.endpoint(&self.portal.landing_path)?;
        let request = self.client.get(url);
        let html = self.send(request).await?;

        let token = extract_token(&html, &self.token_pattern)
            .ok_or_else(|| FetchError::Auth("landing page carries no session token".to_string()))?;

        tracing::debug!(
            "[{}] Acquired session token (refreshes: {})",
            self.session.session_id,
            self.session.token_refreshes
        );
        self.session.set_token(token.clone());
        Ok(token)
    }

    /// Returns the cached token, acquiring one on first use
    async fn token(&mut self) -> Result<String, FetchError> {
        match self.session.token.clone() {
            Some(token) => Ok(token),
            None => self.acquire_token().await,
        }
    }

    async fn post_search(&mut self, prefix: &Prefix, token: &str) -> Result<String, FetchError> {
        let url = self.endpoint(&self.portal.search_path)?;

        let mut form: Vec<(String, String)> = self
            .portal
            .search_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        form.push((self.portal.token_param.clone(), token.to_string()));
        form.push((self.portal.search_field.clone(), prefix.as_str().to_string()));

        let request = self.client.post(url).form(&form);
        self.send(request).await
    }

    async fn get_page(&mut self, page: u32) -> Result<String, FetchError> {
        let url = self.endpoint(&self.portal.results_path)?;

        let mut query: Vec<(String, String)> = self
            .portal
            .page_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        query.push((self.portal.page_param.clone(), page.to_string()));

        let request = self
            .client
            .get(url.clone())
            .query(&query)
            .header(header::REFERER, url.as_str());
        self.send(request).await
    }

    /// Posts a portal action for an opened record
    async fn post_action(
        &mut self,
        path: &str,
        params: &[(String, String)],
        action: &str,
    ) -> Result<String, FetchError> {
        let token = self.token().await?;
        let url = self.endpoint(path)?;

        let mut query = params.to_vec();
        query.push((self.portal.action_param.clone(), action.to_string()));
        query.push((self.portal.token_param.clone(), token));

        let request = self.client.post(url).query(&query).body("");
        self.send(request).await
    }

    fn cards(&self, html: &str) -> Vec<RecordSummary> {
        parse_result_cards(html, &self.portal.identity_param)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    fn session_id(&self) -> &str {
        &self.session.session_id
    }

    async fn submit_search(&mut self, prefix: &Prefix) -> Result<SearchHandle, FetchError> {
        let token = self.token().await?;

        let html = match self.post_search(prefix, &token).await {
            Ok(html) => html,
            Err(e) => {
                // One refresh: the portal may have expired the session token
                tracing::warn!(
                    "[{}] Search for '{}' failed ({}), refreshing token",
                    self.session.session_id,
                    prefix,
                    e
                );
                let token = match self.acquire_token().await {
                    Ok(token) => token,
                    Err(e) => {
                        self.session.invalidate_token();
                        return Err(e);
                    }
                };
                self.post_search(prefix, &token).await?
            }
        };

        let mut handle = SearchHandle::new(prefix.clone());
        handle.first_page = Some(self.cards(&html));
        Ok(handle)
    }

    async fn fetch_page(
        &mut self,
        handle: &mut SearchHandle,
        page: u32,
    ) -> Result<PageOutcome, FetchError> {
        let cards = match (page, handle.first_page.take()) {
            (1, Some(cards)) => cards,
            _ => {
                let html = self.get_page(page).await?;
                self.cards(&html)
            }
        };

        if cards.is_empty() {
            Ok(PageOutcome::EndOfResults)
        } else {
            Ok(PageOutcome::Records(cards))
        }
    }

    async fn open_detail(&mut self, record: &RecordSummary) -> Result<DetailContext, FetchError> {
        let path = self.portal.results_path.clone();
        let action = self.portal.open_detail_action.clone();
        self.post_action(&path, &record.detail_params, &action)
            .await?;
        Ok(DetailContext::opened(record)?)
    }

    async fn fetch_tab(
        &mut self,
        context: &DetailContext,
        tab: DetailTab,
    ) -> Result<String, FetchError> {
        context.ensure_next(tab)?;

        let actions = &self.portal.tab_actions;
        let (path, action) = match tab {
            DetailTab::Situation => (&self.portal.results_path, &actions.situation),
            DetailTab::Dossier => (&self.portal.detail_path, &actions.dossier),
            DetailTab::Diplomas => (&self.portal.detail_path, &actions.diplomas),
            DetailTab::Personal => (&self.portal.detail_path, &actions.personal),
        };
        let (path, action) = (path.clone(), action.clone());

        self.post_action(&path, &context.params, &action).await
    }
}

impl Drop for HttpFetcher {
    fn drop(&mut self) {
        let session = self.session();
        tracing::debug!(
            "[{}] Session closed after {} requests ({} token refreshes)",
            session.session_id,
            session.request_count,
            session.token_refreshes
        );
    }
}

/// Creates one [`HttpFetcher`] per worker
pub struct HttpFetcherFactory {
    portal: Arc<PortalConfig>,
    min_interval: Duration,
}

impl HttpFetcherFactory {
    pub fn new(portal: PortalConfig, min_interval: Duration) -> Self {
        Self {
            portal: Arc::new(portal),
            min_interval,
        }
    }
}

impl FetcherFactory for HttpFetcherFactory {
    type Fetcher = HttpFetcher;

    fn create(&self, worker_id: u32, generation: u32) -> Result<HttpFetcher, FetchError> {
        HttpFetcher::new(
            Arc::clone(&self.portal),
            self.min_interval,
            format!("worker-{}-session-{}", worker_id, generation),
        )
    }
}
