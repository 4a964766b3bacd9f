//! Deterministic in-memory directory used by the crawl tests
//!
//! The fake directory answers a prefix search with every entry whose name
//! starts with the prefix, truncated to a fixed ceiling, split into pages.

#![allow(dead_code)]

use directory_sweep::config::{parse_config, Config};
use directory_sweep::crawler::{
    DetailContext, FetchError, Fetcher, FetcherFactory, PageOutcome, RecordSummary, SearchHandle,
};
use directory_sweep::prefix::Prefix;
use directory_sweep::state::{DetailTab, NavigationError};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake site saw, shared by every session
#[derive(Debug, Default)]
pub struct Activity {
    /// (session id, prefix) for every search, in order
    pub searches: Vec<(String, String)>,

    /// (worker id, generation, session id) for every session built
    pub sessions: Vec<(u32, u32, String)>,

    /// (session id, identity, tab) for every tab fetched
    pub tabs: Vec<(String, String, String)>,

    /// Sessions currently inside a page request
    active: HashSet<String>,

    /// Times a session was used by two requests at once
    pub overlaps: usize,

    /// Highest number of sessions paging at the same time
    pub max_active: usize,
}

impl Activity {
    pub fn searched_prefixes(&self) -> Vec<String> {
        self.searches.iter().map(|(_, p)| p.clone()).collect()
    }
}

/// The synthetic directory
#[derive(Debug, Clone)]
pub struct FakeDirectory {
    /// (identity, name)
    pub entries: Vec<(String, String)>,
    pub page_size: usize,
    /// Results exposed per search
    pub ceiling: usize,
    pub failing: HashSet<String>,
    pub crashing: HashSet<String>,
    /// Prefixes whose records answer every tab as out of order
    pub misnavigating: HashSet<String>,
    pub page_delay: Duration,
}

impl FakeDirectory {
    pub fn new(names: &[&str], page_size: usize, ceiling: usize) -> Self {
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| (format!("{}", 10_000 + i), name.to_string()))
            .collect();

        Self {
            entries,
            page_size,
            ceiling,
            failing: HashSet::new(),
            crashing: HashSet::new(),
            misnavigating: HashSet::new(),
            page_delay: Duration::ZERO,
        }
    }

    pub fn failing(mut self, prefix: &str) -> Self {
        self.failing.insert(prefix.to_string());
        self
    }

    pub fn crashing(mut self, prefix: &str) -> Self {
        self.crashing.insert(prefix.to_string());
        self
    }

    pub fn misnavigating(mut self, prefix: &str) -> Self {
        self.misnavigating.insert(prefix.to_string());
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    fn matches(&self, prefix: &str) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(_, name)| name.starts_with(prefix))
            .take(self.ceiling)
            .cloned()
            .collect()
    }
}

pub struct FakeFactory {
    directory: Arc<FakeDirectory>,
    activity: Arc<Mutex<Activity>>,
    serial: AtomicU32,
}

impl FakeFactory {
    pub fn new(directory: FakeDirectory) -> Self {
        Self {
            directory: Arc::new(directory),
            activity: Arc::new(Mutex::new(Activity::default())),
            serial: AtomicU32::new(0),
        }
    }

    /// Handle on the shared activity log, usable after the factory moved
    pub fn activity(&self) -> Arc<Mutex<Activity>> {
        Arc::clone(&self.activity)
    }
}

impl FetcherFactory for FakeFactory {
    type Fetcher = FakeFetcher;

    fn create(&self, worker_id: u32, generation: u32) -> Result<FakeFetcher, FetchError> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("session-{}", serial);

        self.activity
            .lock()
            .unwrap()
            .sessions
            .push((worker_id, generation, session_id.clone()));

        Ok(FakeFetcher {
            session_id,
            directory: Arc::clone(&self.directory),
            activity: Arc::clone(&self.activity),
            results: Vec::new(),
            current_prefix: String::new(),
        })
    }
}

pub struct FakeFetcher {
    session_id: String,
    directory: Arc<FakeDirectory>,
    activity: Arc<Mutex<Activity>>,
    results: Vec<(String, String)>,
    current_prefix: String,
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn submit_search(&mut self, prefix: &Prefix) -> Result<SearchHandle, FetchError> {
        if self.directory.crashing.contains(prefix.as_str()) {
            panic!("simulated crash on '{}'", prefix);
        }

        self.activity
            .lock()
            .unwrap()
            .searches
            .push((self.session_id.clone(), prefix.as_str().to_string()));

        if self.directory.failing.contains(prefix.as_str()) {
            return Err(FetchError::Timeout(format!("search for '{}'", prefix)));
        }

        self.current_prefix = prefix.as_str().to_string();
        self.results = self.directory.matches(prefix.as_str());
        Ok(SearchHandle::new(prefix.clone()))
    }

    async fn fetch_page(
        &mut self,
        _handle: &mut SearchHandle,
        page: u32,
    ) -> Result<PageOutcome, FetchError> {
        {
            let mut activity = self.activity.lock().unwrap();
            if !activity.active.insert(self.session_id.clone()) {
                activity.overlaps += 1;
            }
            activity.max_active = activity.max_active.max(activity.active.len());
        }

        if !self.directory.page_delay.is_zero() {
            tokio::time::sleep(self.directory.page_delay).await;
        }

        self.activity
            .lock()
            .unwrap()
            .active
            .remove(&self.session_id);

        let size = self.directory.page_size;
        let start = (page as usize - 1) * size;
        let cards: Vec<RecordSummary> = self
            .results
            .iter()
            .skip(start)
            .take(size)
            .map(|(identity, name)| RecordSummary {
                identity: identity.clone(),
                name: name.clone(),
                profession: Some("Médecin".to_string()),
                detail_params: vec![("_mapportlet_idRpps".to_string(), identity.clone())],
                ..Default::default()
            })
            .collect();

        if cards.is_empty() {
            Ok(PageOutcome::EndOfResults)
        } else {
            Ok(PageOutcome::Records(cards))
        }
    }

    async fn open_detail(&mut self, record: &RecordSummary) -> Result<DetailContext, FetchError> {
        Ok(DetailContext::opened(record)?)
    }

    async fn fetch_tab(
        &mut self,
        context: &DetailContext,
        tab: DetailTab,
    ) -> Result<String, FetchError> {
        if self.directory.misnavigating.contains(&self.current_prefix) {
            return Err(FetchError::Navigation(NavigationError::OutOfOrder {
                expected: context.next_tab(),
                got: tab,
            }));
        }
        context.ensure_next(tab)?;
        self.activity.lock().unwrap().tabs.push((
            self.session_id.clone(),
            context.identity.clone(),
            tab.name().to_string(),
        ));

        Ok(format!(
            r#"<div class="contenu_{tab}"><h2>Fiche</h2>
               <span class="label">Identifiant :</span><span class="txt">{id}</span></div>"#,
            tab = tab.name(),
            id = context.identity
        ))
    }
}

/// Builds a crawl configuration with no delays
pub fn test_config(
    db_path: &Path,
    alphabet: &str,
    prefixes: &[&str],
    result_ceiling: u32,
    ceiling_margin: u32,
    workers: u32,
) -> Config {
    let prefixes: Vec<String> = prefixes.iter().map(|p| format!("\"{}\"", p)).collect();

    let toml = format!(
        r#"
[crawler]
workers = {workers}
max-pages = 10
result-ceiling = {result_ceiling}
ceiling-margin = {ceiling_margin}

[seeds]
alphabet = "{alphabet}"
prefixes = [{prefixes}]

[delays]
between-records-ms = 0
between-tabs-ms = 0
between-pages-ms = 0
min-request-interval-ms = 0

[portal]
base-url = "http://127.0.0.1:9"

[output]
database-path = "{db}"
report-path = "{report}"
busy-timeout-ms = 5000
"#,
        workers = workers,
        result_ceiling = result_ceiling,
        ceiling_margin = ceiling_margin,
        alphabet = alphabet,
        prefixes = prefixes.join(", "),
        db = db_path.display(),
        report = db_path.with_extension("md").display(),
    );

    parse_config(&toml).expect("test config should be valid")
}
