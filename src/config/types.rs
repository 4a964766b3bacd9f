use crate::prefix::{Alphabet, PrefixError, SeedPlan};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Directory-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    pub portal: PortalConfig,
    pub output: OutputConfig,
}

impl Config {
    /// The alphabet prefixes are built from
    pub fn alphabet(&self) -> Result<Alphabet, PrefixError> {
        Alphabet::new(&self.seeds.alphabet)
    }

    /// How the initial frontier should be seeded
    ///
    /// A non-empty explicit prefix list wins over depth/breadth generation.
    pub fn seed_plan(&self) -> SeedPlan {
        if self.seeds.prefixes.is_empty() {
            SeedPlan::Generated {
                depth: self.seeds.depth,
                breadth: self.seeds.breadth,
            }
        } else {
            SeedPlan::Explicit(self.seeds.prefixes.clone())
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of isolated workers draining prefixes concurrently
    pub workers: u32,

    /// Maximum number of result pages requested per prefix
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Number of records the site exposes for a single query
    #[serde(rename = "result-ceiling", default = "default_result_ceiling")]
    pub result_ceiling: u32,

    /// Safety margin below the ceiling at which a prefix counts as truncated
    #[serde(rename = "ceiling-margin", default = "default_ceiling_margin")]
    pub ceiling_margin: u32,

    /// Split truncated prefixes into children
    #[serde(rename = "smart-expansion", default = "default_true")]
    pub smart_expansion: bool,

    /// Records stored per prefix, 0 for unlimited
    #[serde(rename = "max-records-per-prefix", default)]
    pub max_records_per_prefix: u32,

    /// Longest prefix expansion may produce, 0 for unlimited
    #[serde(rename = "max-prefix-length", default)]
    pub max_prefix_length: u32,
}

/// Seed prefix generation
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Letters prefixes are built from, in enumeration order
    #[serde(default = "default_alphabet")]
    pub alphabet: String,

    /// Length of generated seed prefixes
    #[serde(default = "default_depth")]
    pub depth: usize,

    /// Keep only the first N generated prefixes
    #[serde(default)]
    pub breadth: Option<usize>,

    /// Explicit seed list; overrides depth/breadth when non-empty
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            alphabet: default_alphabet(),
            depth: default_depth(),
            breadth: None,
            prefixes: Vec::new(),
        }
    }
}

/// Per-worker pacing (all values in milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    #[serde(rename = "between-records-ms", default = "default_between_records")]
    pub between_records_ms: u64,

    #[serde(rename = "between-tabs-ms", default = "default_between_tabs")]
    pub between_tabs_ms: u64,

    #[serde(rename = "between-pages-ms", default = "default_between_pages")]
    pub between_pages_ms: u64,

    /// Minimum gap between any two requests of one session
    #[serde(rename = "min-request-interval-ms", default = "default_min_interval")]
    pub min_request_interval_ms: u64,
}

impl DelayConfig {
    pub fn between_records(&self) -> Duration {
        Duration::from_millis(self.between_records_ms)
    }

    pub fn between_tabs(&self) -> Duration {
        Duration::from_millis(self.between_tabs_ms)
    }

    pub fn between_pages(&self) -> Duration {
        Duration::from_millis(self.between_pages_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// No waiting at all (used by tests and dry runs)
    pub fn none() -> Self {
        Self {
            between_records_ms: 0,
            between_tabs_ms: 0,
            between_pages_ms: 0,
            min_request_interval_ms: 0,
        }
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            between_records_ms: default_between_records(),
            between_tabs_ms: default_between_tabs(),
            between_pages_ms: default_between_pages(),
            min_request_interval_ms: default_min_interval(),
        }
    }
}

/// Directory portal endpoints and form field names
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Root of the directory site, e.g. `https://annuaire.sante.fr`
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page carrying the session token in its search form
    #[serde(rename = "landing-path", default = "default_landing_path")]
    pub landing_path: String,

    /// Endpoint the search form is posted to
    #[serde(rename = "search-path", default = "default_search_path")]
    pub search_path: String,

    /// Result list endpoint (pagination, detail opening, situation tab)
    #[serde(rename = "results-path", default = "default_results_path")]
    pub results_path: String,

    /// Endpoint serving the dossier, diplomas and personal tabs
    #[serde(rename = "detail-path", default = "default_detail_path")]
    pub detail_path: String,

    /// Regex with one capture group locating the token in the landing page
    #[serde(rename = "token-pattern", default = "default_token_pattern")]
    pub token_pattern: String,

    #[serde(rename = "token-param", default = "default_token_param")]
    pub token_param: String,

    /// Form field receiving the search prefix
    #[serde(rename = "search-field", default = "default_search_field")]
    pub search_field: String,

    /// Fixed form fields posted with every search
    #[serde(rename = "search-params", default = "default_search_params")]
    pub search_params: BTreeMap<String, String>,

    /// Fixed query parameters sent with every result page request
    #[serde(rename = "page-params", default = "default_page_params")]
    pub page_params: BTreeMap<String, String>,

    /// Query parameter selecting the result page
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Query parameter of a result link holding the record identity
    #[serde(rename = "identity-param", default = "default_identity_param")]
    pub identity_param: String,

    /// Query parameter naming the portal action on detail requests
    #[serde(rename = "action-param", default = "default_action_param")]
    pub action_param: String,

    #[serde(rename = "open-detail-action", default = "default_open_action")]
    pub open_detail_action: String,

    #[serde(rename = "tab-actions", default)]
    pub tab_actions: TabActions,
}

impl PortalConfig {
    /// Portal settings with every endpoint and field name at its default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            landing_path: default_landing_path(),
            search_path: default_search_path(),
            results_path: default_results_path(),
            detail_path: default_detail_path(),
            token_pattern: default_token_pattern(),
            token_param: default_token_param(),
            search_field: default_search_field(),
            search_params: default_search_params(),
            page_params: default_page_params(),
            page_param: default_page_param(),
            identity_param: default_identity_param(),
            action_param: default_action_param(),
            open_detail_action: default_open_action(),
            tab_actions: TabActions::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Portal action names for each detail tab
#[derive(Debug, Clone, Deserialize)]
pub struct TabActions {
    #[serde(default = "default_situation_action")]
    pub situation: String,
    #[serde(default = "default_dossier_action")]
    pub dossier: String,
    #[serde(default = "default_diplomas_action")]
    pub diplomas: String,
    #[serde(default = "default_personal_action")]
    pub personal: String,
}

impl Default for TabActions {
    fn default() -> Self {
        Self {
            situation: default_situation_action(),
            dossier: default_dossier_action(),
            diplomas: default_diplomas_action(),
            personal: default_personal_action(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown run report
    #[serde(rename = "report-path", default = "default_report_path")]
    pub report_path: String,

    /// How long a writer waits on a locked database (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl OutputConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_max_pages() -> u32 {
    10
}

fn default_result_ceiling() -> u32 {
    100
}

fn default_ceiling_margin() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_alphabet() -> String {
    "abcdefghijklmnopqrstuvwxyz".to_string()
}

fn default_depth() -> usize {
    2
}

fn default_between_records() -> u64 {
    1000
}

fn default_between_tabs() -> u64 {
    500
}

fn default_between_pages() -> u64 {
    200
}

fn default_min_interval() -> u64 {
    100
}

fn default_user_agent() -> String {
    format!("directory-sweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_landing_path() -> String {
    "/web/site-pro".to_string()
}

fn default_search_path() -> String {
    "/web/site-pro/home".to_string()
}

fn default_results_path() -> String {
    "/web/site-pro/recherche/resultats".to_string()
}

fn default_detail_path() -> String {
    "/web/site-pro/information-detaillees".to_string()
}

fn default_token_pattern() -> String {
    r#"p_auth=([^&"']+)"#.to_string()
}

fn default_token_param() -> String {
    "p_auth".to_string()
}

fn default_search_field() -> String {
    "_rechercheportlet_INSTANCE_blk14HrIzEMS_texttofind".to_string()
}

fn default_search_params() -> BTreeMap<String, String> {
    let portlet = "rechercheportlet_INSTANCE_blk14HrIzEMS";
    [
        ("p_p_id", portlet.to_string()),
        ("p_p_lifecycle", "1".to_string()),
        ("p_p_state", "normal".to_string()),
        ("p_p_mode", "view".to_string()),
        (
            "_rechercheportlet_INSTANCE_blk14HrIzEMS_javax.portlet.action",
            "rechercheAction".to_string(),
        ),
        ("_rechercheportlet_INSTANCE_blk14HrIzEMS_integralite", "active_only".to_string()),
        ("_rechercheportlet_INSTANCE_blk14HrIzEMS_typeRecherche", "textLibre".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_page_params() -> BTreeMap<String, String> {
    [
        ("p_p_id", "resultatportlet"),
        ("p_p_lifecycle", "0"),
        ("p_p_state", "normal"),
        ("p_p_mode", "view"),
        ("_resultatportlet_delta", "10"),
        ("_resultatportlet_resetCur", "false"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_page_param() -> String {
    "_resultatportlet_cur".to_string()
}

fn default_identity_param() -> String {
    "_mapportlet_idRpps".to_string()
}

fn default_action_param() -> String {
    "_mapportlet_javax.portlet.action".to_string()
}

fn default_open_action() -> String {
    "DetailsPPAction".to_string()
}

fn default_situation_action() -> String {
    "infoDetailPP".to_string()
}

fn default_dossier_action() -> String {
    "detailsPPDossierPro".to_string()
}

fn default_diplomas_action() -> String {
    "detailsPPDiplomes".to_string()
}

fn default_personal_action() -> String {
    "detailsPPPersonne".to_string()
}

fn default_report_path() -> String {
    "logs/sweep_report.md".to_string()
}

fn default_busy_timeout() -> u64 {
    30_000
}
