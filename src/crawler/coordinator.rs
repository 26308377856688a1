//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator owns the `CrawlState` and is the only code that mutates
//! it. Its control loop:
//! - dispatches pending pages up to the concurrency budget
//! - runs fetch and extraction for each page as a task in a `JoinSet`
//! - applies completions one at a time, in completion order
//! - hands records, page outcomes and checkpoints to the sink
//! - detects completion (`Running -> Draining -> Done`) and cancellation

use super::events::{CrawlEvent, CrawlObserver, TracingObserver};
use super::extractor::{extract, CompiledSelectors, Extraction};
use super::fetcher::{FetchStatus, Fetcher};
use super::frontier::{seed_pages, PageRef};
use crate::config::{Config, FetchConfig};
use crate::output::{CrawlSummary, PageReport, Sink};
use crate::state::{CrawlPhase, CrawlSnapshot, CrawlState, FailedPage, PageState};
use crate::{ConfigError, WalkError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Per-site settings the control loop needs at dispatch and completion time
#[derive(Debug)]
struct SitePlan {
    selectors: Arc<CompiledSelectors>,
    max_pages: Option<u32>,
}

/// What a page task hands back to the control loop
#[derive(Debug)]
struct PageOutcome {
    page: PageRef,
    status: FetchStatus,
    attempts: u32,
    /// Present only when the fetch succeeded
    extraction: Option<Extraction>,
}

type PageTasks = JoinSet<Result<PageOutcome, WalkError>>;

#[derive(Debug, Default)]
struct RunCounters {
    pages_visited: u64,
    records: u64,
    warnings: u64,
    since_checkpoint: u32,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    sites: HashMap<String, SitePlan>,
    fetch_config: Arc<FetchConfig>,
    fetcher: Arc<dyn Fetcher>,
    sink: Box<dyn Sink>,
    observer: Arc<dyn CrawlObserver>,
    state: CrawlState,
    budget: usize,
    checkpoint_interval: u32,
    cancel: CancellationToken,
    counters: RunCounters,
    /// Failures already recorded before this run started
    failed_offset: usize,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Compiles every site's selectors, restores `resume` if given, drops
    /// pending pages of sites that are no longer configured, and seeds the
    /// start pages. Seeds that were already visited are skipped.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fetcher` - Performs the page fetches
    /// * `sink` - Receives records, page outcomes and checkpoints
    /// * `resume` - Checkpoint to continue from
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(WalkError)` - A selector or start URL is invalid, or the budget is zero
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        sink: Box<dyn Sink>,
        resume: Option<CrawlSnapshot>,
    ) -> Result<Self, WalkError> {
        if config.crawler.concurrency == 0 {
            return Err(ConfigError::Validation("concurrency must be >= 1".to_string()).into());
        }

        let mut sites = HashMap::new();
        let mut seeds = Vec::new();
        for site in &config.sites {
            let selectors = CompiledSelectors::compile(&site.selectors)?;
            sites.insert(
                site.id.clone(),
                SitePlan {
                    selectors: Arc::new(selectors),
                    max_pages: site.max_pages,
                },
            );
            seeds.extend(seed_pages(site)?);
        }

        let mut state = match resume {
            Some(snapshot) => CrawlState::restore(snapshot),
            None => CrawlState::new(),
        };

        let known: HashSet<&str> = sites.keys().map(String::as_str).collect();
        let dropped = state.retain_sites(&known);
        if dropped > 0 {
            tracing::warn!(
                "Dropped {} pending pages of sites not selected for this run",
                dropped
            );
        }

        let seeded = state.enqueue(seeds);
        tracing::debug!(
            "Seeded {} pages; {} pending, {} already visited",
            seeded,
            state.frontier().len(),
            state.frontier().visited_count()
        );

        let failed_offset = state.failed().len();

        Ok(Self {
            sites,
            fetch_config: Arc::new(config.fetch.clone()),
            fetcher,
            sink,
            observer: Arc::new(TracingObserver),
            state,
            budget: config.crawler.concurrency,
            checkpoint_interval: config.crawler.checkpoint_interval,
            cancel: CancellationToken::new(),
            counters: RunCounters::default(),
            failed_offset,
        })
    }

    /// Replaces the default `TracingObserver`
    pub fn with_observer(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this crawl when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Runs the crawl until it is done or cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - The crawl reached `Done` or `Cancelled`
    /// * `Err(WalkError)` - An invariant was violated or the sink failed
    pub async fn run(&mut self) -> Result<CrawlSummary, WalkError> {
        if self.state.phase().is_terminal() {
            return Err(WalkError::Invariant(format!(
                "run called on a crawl that is already {}",
                self.state.phase()
            )));
        }

        let started_at = Utc::now();
        let cancel = self.cancel.clone();
        let mut tasks: PageTasks = JoinSet::new();

        tracing::info!(
            "Crawling {} sites with {} pending pages (budget {})",
            self.sites.len(),
            self.state.frontier().len(),
            self.budget
        );

        while !cancel.is_cancelled() {
            self.dispatch(&mut tasks)?;

            if self.state.is_idle() {
                self.set_phase(CrawlPhase::Draining);
                tokio::task::yield_now().await;

                if cancel.is_cancelled() {
                    break;
                }
                if self.state.is_idle() {
                    self.set_phase(CrawlPhase::Done);
                    break;
                }
                self.set_phase(CrawlPhase::Running);
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(joined) => self.handle_joined(joined)?,
                    None => {
                        return Err(WalkError::Invariant(format!(
                            "{} pages in flight with no running tasks",
                            self.state.in_flight_len()
                        )))
                    }
                },
            }
        }

        if self.state.phase() != CrawlPhase::Done {
            tracing::info!(
                "Cancellation requested; waiting for {} in-flight pages",
                tasks.len()
            );
            self.drain_cancelled(&mut tasks).await?;
            self.set_phase(CrawlPhase::Cancelled);
        }

        self.checkpoint()?;

        let summary = self.summary(started_at);
        self.sink.finish(&summary)?;

        tracing::info!(
            "Crawl {}: {} pages visited, {} records, {} failed",
            summary.phase,
            summary.pages_visited,
            summary.records_extracted,
            summary.pages_failed
        );

        Ok(summary)
    }

    /// Starts page tasks until the budget is full or nothing is pending
    fn dispatch(&mut self, tasks: &mut PageTasks) -> Result<usize, WalkError> {
        let room = self.budget.saturating_sub(self.state.in_flight_len());
        if room == 0 {
            return Ok(0);
        }

        let batch = self.state.dispatch(room)?;
        for page in batch.iter().cloned() {
            let plan = self.sites.get(page.site_id()).ok_or_else(|| {
                WalkError::Invariant(format!("{} belongs to unknown site", page.dedup_key()))
            })?;

            tasks.spawn(process_page(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.fetch_config),
                Arc::clone(&plan.selectors),
                page,
            ));
        }

        debug_assert!(self.state.in_flight_len() <= self.budget);
        Ok(batch.len())
    }

    /// Lets in-flight pages finish within one fetch timeout, then aborts the rest
    ///
    /// Aborted pages stay in flight, so the final checkpoint lists them for
    /// the next run to fetch again.
    async fn drain_cancelled(&mut self, tasks: &mut PageTasks) -> Result<(), WalkError> {
        let deadline = tokio::time::Instant::now() + self.fetch_config.timeout();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => self.handle_joined(joined)?,
                Ok(None) => return Ok(()),
                Err(_) => break,
            }
        }

        tracing::warn!(
            "Abandoning {} in-flight pages after the grace period",
            tasks.len()
        );
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            self.handle_joined(joined)?;
        }
        Ok(())
    }

    fn handle_joined(
        &mut self,
        joined: Result<Result<PageOutcome, WalkError>, JoinError>,
    ) -> Result<(), WalkError> {
        match joined {
            Ok(outcome) => self.complete(outcome?),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(WalkError::Invariant(format!("page task failed: {}", e))),
        }
    }

    /// Applies one finished page to the crawl state and the sink
    fn complete(&mut self, outcome: PageOutcome) -> Result<(), WalkError> {
        let PageOutcome {
            page,
            status,
            attempts,
            extraction,
        } = outcome;

        self.state.complete(page.dedup_key())?;
        self.observer.on_event(&CrawlEvent::FetchCompleted {
            page: &page,
            status: &status,
            attempts,
        });

        let records = extraction.as_ref().map_or(0, |e| e.records.len());
        self.sink.record_page(&PageReport {
            page: &page,
            state: PageState::from_outcome(&status, records),
            status: &status,
            attempts,
            records,
        })?;

        match extraction {
            Some(extraction) => self.absorb(&page, extraction)?,
            None => {
                self.observer.on_event(&CrawlEvent::PageFailed {
                    page: &page,
                    status: &status,
                    attempts,
                });
                self.state.record_failure(FailedPage {
                    page,
                    status,
                    attempts,
                });
            }
        }

        self.counters.since_checkpoint += 1;
        if self.counters.since_checkpoint >= self.checkpoint_interval {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Delivers a successful page's records and follows its next pages
    fn absorb(&mut self, page: &PageRef, extraction: Extraction) -> Result<(), WalkError> {
        self.counters.pages_visited += 1;

        for warning in &extraction.warnings {
            self.counters.warnings += 1;
            self.observer.on_event(&CrawlEvent::ExtractionWarning(warning));
        }

        // Zero records ends this branch of the pagination chain
        if extraction.records.is_empty() {
            self.observer.on_event(&CrawlEvent::ContentExhausted { page });
            return Ok(());
        }

        self.sink.accept(&extraction.records)?;
        self.counters.records += extraction.records.len() as u64;

        let cap = self
            .sites
            .get(page.site_id())
            .and_then(|plan| plan.max_pages)
            .unwrap_or(u32::MAX);

        let next_pages = self.state.enqueue(
            extraction
                .next_refs
                .into_iter()
                .filter(|next| next.page_number() <= cap),
        );

        self.observer.on_event(&CrawlEvent::PageExtracted {
            page,
            records: extraction.records.len(),
            next_pages,
        });
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<(), WalkError> {
        let snapshot = self.state.snapshot();
        self.sink.checkpoint(&snapshot)?;
        self.counters.since_checkpoint = 0;

        self.observer.on_event(&CrawlEvent::Checkpoint {
            pending: snapshot.pending.len() + snapshot.in_flight.len(),
            visited: snapshot.visited.len(),
        });
        Ok(())
    }

    fn set_phase(&mut self, to: CrawlPhase) {
        let from = self.state.set_phase(to);
        if from != to {
            self.observer.on_event(&CrawlEvent::PhaseChanged { from, to });
        }
    }

    fn summary(&self, started_at: DateTime<Utc>) -> CrawlSummary {
        let failed = self.state.failed()[self.failed_offset..].to_vec();
        let phase = self.state.phase();

        CrawlSummary {
            started_at,
            finished_at: Utc::now(),
            phase,
            pages_visited: self.counters.pages_visited,
            records_extracted: self.counters.records,
            pages_failed: failed.len() as u64,
            warnings: self.counters.warnings,
            cancelled: phase == CrawlPhase::Cancelled,
            failed,
        }
    }
}

/// Fetches one page and, if that succeeded, extracts it
///
/// Runs inside a task; touches no crawl state.
async fn process_page(
    fetcher: Arc<dyn Fetcher>,
    config: Arc<FetchConfig>,
    selectors: Arc<CompiledSelectors>,
    page: PageRef,
) -> Result<PageOutcome, WalkError> {
    let result = fetcher.fetch(&page, &config).await;

    let extraction = if result.status.is_success() {
        Some(extract(&result, &selectors)?)
    } else {
        None
    };

    Ok(PageOutcome {
        page,
        status: result.status,
        attempts: result.attempts,
        extraction,
    })
}
