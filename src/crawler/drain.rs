//! Single-prefix drain
//!
//! One worker runs one drain at a time:
//! 1. Submit the prefix search
//! 2. Page through the result list in order, upserting each card's summary
//! 3. Only once every page is collected, open each record and fetch its four
//!    tabs in portal order, then upsert the extracted detail
//!
//! Listing and detail navigation are never interleaved; the portal tracks one
//! navigation position per session.

use crate::config::{Config, DelayConfig};
use crate::crawler::fetcher::{FetchError, Fetcher, PageOutcome, RecordSummary};
use crate::crawler::parser::extract_tab_content;
use crate::crawler::PrefixResult;
use crate::prefix::Prefix;
use crate::state::DetailTab;
use crate::storage::{RecordStore, RecordUpdate};
use crate::SweepError;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Per-drain limits and courtesy delays
#[derive(Debug, Clone)]
pub struct DrainSettings {
    /// Pagination cap per prefix
    pub max_pages: u32,

    /// Records stored per prefix (0 = unlimited)
    pub max_records: u64,

    pub delays: DelayConfig,
}

impl DrainSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_pages: config.crawler.max_pages,
            max_records: u64::from(config.crawler.max_records_per_prefix),
            delays: config.delays.clone(),
        }
    }

    fn may_store(&self, stored: u64) -> bool {
        self.max_records == 0 || stored < self.max_records
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Drains every page and record of one prefix
///
/// Fetch and storage failures end up in the returned result's `error` field;
/// summaries stored before a failure are kept, and the detail phase is skipped
/// for a prefix whose listing failed.
///
/// # Arguments
///
/// * `fetcher` - The worker's own session
/// * `store` - The worker's own record store handle
/// * `prefix` - The prefix to drain
/// * `worker_id` - Id used in logs and in the result
/// * `settings` - Limits and delays
///
/// # Returns
///
/// * `Ok(PrefixResult)` - The drain outcome, successful or not
/// * `Err(SweepError)` - Detail navigation was driven out of order
pub async fn drain_prefix<F, S>(
    fetcher: &mut F,
    store: &mut S,
    prefix: &Prefix,
    worker_id: u32,
    settings: &DrainSettings,
) -> Result<PrefixResult, SweepError>
where
    F: Fetcher + ?Sized,
    S: RecordStore + ?Sized,
{
    let started = Instant::now();
    let mut result = PrefixResult::new(prefix.clone(), worker_id);

    tracing::info!(
        "[worker {}] Draining prefix '{}' ({})",
        worker_id,
        prefix,
        fetcher.session_id()
    );

    let collected = match collect_summaries(fetcher, store, prefix, settings, &mut result).await {
        Ok(collected) => collected,
        Err(error) => {
            tracing::error!(
                "[worker {}] Prefix '{}' failed after {} pages: {}",
                worker_id,
                prefix,
                result.pages,
                error
            );
            result.error = Some(error);
            result.elapsed = started.elapsed();
            return Ok(result);
        }
    };

    for (index, summary) in collected.iter().enumerate() {
        if index > 0 {
            pause(settings.delays.between_records()).await;
        }

        let update = fetch_detail(fetcher, summary, prefix, worker_id, settings).await?;
        if let Err(e) = store.upsert_record(&update) {
            let error = format!("failed to store detail of {}: {}", summary.identity, e);
            tracing::error!("[worker {}] Prefix '{}': {}", worker_id, prefix, error);
            result.error = Some(error);
            break;
        }
    }

    result.elapsed = started.elapsed();
    tracing::info!(
        "[worker {}] Prefix '{}' done: {} found, {} stored, {} pages in {:?}",
        worker_id,
        prefix,
        result.records_found,
        result.records_stored,
        result.pages,
        result.elapsed
    );

    Ok(result)
}

/// Submits the search and collects every page's cards
///
/// Summaries are upserted as each page arrives. Returns the distinct cards
/// whose detail should be fetched, or a message describing why the listing
/// stopped early.
async fn collect_summaries<F, S>(
    fetcher: &mut F,
    store: &mut S,
    prefix: &Prefix,
    settings: &DrainSettings,
    result: &mut PrefixResult,
) -> Result<Vec<RecordSummary>, String>
where
    F: Fetcher + ?Sized,
    S: RecordStore + ?Sized,
{
    let mut handle = fetcher
        .submit_search(prefix)
        .await
        .map_err(|e| format!("search failed: {}", e))?;

    let mut seen = HashSet::new();
    let mut collected = Vec::new();

    for page in 1..=settings.max_pages {
        if page > 1 {
            pause(settings.delays.between_pages()).await;
        }

        let cards = match fetcher.fetch_page(&mut handle, page).await {
            Ok(PageOutcome::Records(cards)) => cards,
            Ok(PageOutcome::EndOfResults) => break,
            Err(e) => return Err(format!("page {} failed: {}", page, e)),
        };

        tracing::debug!(
            "[worker {}] Prefix '{}' page {}: {} cards",
            result.worker_id,
            prefix,
            page,
            cards.len()
        );

        result.pages = page;
        result.records_found += cards.len() as u64;

        for card in cards {
            if card.identity.is_empty() {
                tracing::warn!(
                    "[worker {}] Skipping card without identity on '{}' page {}",
                    result.worker_id,
                    prefix,
                    page
                );
                continue;
            }
            if !seen.insert(card.identity.clone()) || !settings.may_store(result.records_stored) {
                continue;
            }

            store
                .upsert_record(&summary_update(&card, prefix))
                .map_err(|e| format!("failed to store {}: {}", card.identity, e))?;
            result.records_stored += 1;
            collected.push(card);
        }
    }

    Ok(collected)
}

/// Opens one record and fetches its four tabs
///
/// A failed open leaves every tab empty; a failed tab leaves only that tab
/// empty. Navigation errors mean the tabs were driven out of order and are
/// returned as errors.
async fn fetch_detail<F>(
    fetcher: &mut F,
    summary: &RecordSummary,
    prefix: &Prefix,
    worker_id: u32,
    settings: &DrainSettings,
) -> Result<RecordUpdate, SweepError>
where
    F: Fetcher + ?Sized,
{
    let mut update = RecordUpdate::new(summary.identity.clone());
    update.search_prefix = Some(prefix.as_str().to_string());

    let mut context = match fetcher.open_detail(summary).await {
        Ok(context) => context,
        Err(FetchError::Navigation(e)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!(
                "[worker {}] Could not open detail of {}: {}",
                worker_id,
                summary.identity,
                e
            );
            return Ok(update);
        }
    };

    for tab in DetailTab::ALL {
        if tab.index() > 0 {
            pause(settings.delays.between_tabs()).await;
        }

        match fetcher.fetch_tab(&context, tab).await {
            Ok(html) => {
                let content = Some(extract_tab_content(tab, &html));
                match tab {
                    DetailTab::Situation => update.situation_data = content,
                    DetailTab::Dossier => update.dossier_data = content,
                    DetailTab::Diplomas => update.diplomas_data = content,
                    DetailTab::Personal => update.personal_data = content,
                }
            }
            Err(FetchError::Navigation(e)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    "[worker {}] Tab {} of {} failed: {}",
                    worker_id,
                    tab,
                    summary.identity,
                    e
                );
            }
        }

        context.advance(tab)?;
    }
    context.finish()?;

    Ok(update)
}

fn summary_update(card: &RecordSummary, prefix: &Prefix) -> RecordUpdate {
    let name = Some(card.name.clone()).filter(|n| !n.is_empty());
    RecordUpdate {
        identity: card.identity.clone(),
        name,
        profession: card.profession.clone(),
        organization: card.organization.clone(),
        address: card.address.clone(),
        phone: card.phone.clone(),
        email: card.email.clone(),
        search_prefix: Some(prefix.as_str().to_string()),
        ..Default::default()
    }
}
