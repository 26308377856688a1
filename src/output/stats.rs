//! Statistics generation from the crawl database
//!
//! Backs the `--stats` flag: counts across every run stored in the database.

use crate::state::PageState;
use crate::storage::{RunRecord, Storage};
use crate::WalkError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored page outcomes
    pub total_pages: u64,

    /// Count of pages by state; states with no pages are omitted
    pub pages_by_state: HashMap<PageState, u64>,

    pub total_records: u64,

    /// Records per site ID
    pub records_by_site: HashMap<String, u64>,

    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Number of stored pages that ended in an error state
    pub fn error_pages(&self) -> u64 {
        self.pages_by_state
            .iter()
            .filter(|(state, _)| state.is_error())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(WalkError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, WalkError> {
    let total_pages = storage.count_total_pages()?;

    let mut pages_by_state = HashMap::new();
    for state in PageState::all_states() {
        let count = storage.count_pages_by_state(state)?;
        if count > 0 {
            pages_by_state.insert(state, count);
        }
    }

    Ok(CrawlStatistics {
        total_pages,
        pages_by_state,
        total_records: storage.count_records()?,
        records_by_site: storage.count_records_by_site()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run: #{} ({})", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!();
    }

    println!("Overview:");
    println!("  Pages completed: {}", stats.total_pages);
    println!("  Records extracted: {}", stats.total_records);
    println!();

    println!("Pages by State:");
    let mut state_counts: Vec<_> = stats.pages_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if stats.total_pages > 0 {
            (*count as f64 / stats.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.records_by_site.is_empty() {
        println!("Records by Site:");
        let mut sites: Vec<_> = stats.records_by_site.iter().collect();
        sites.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (site, count) in sites {
            println!("  {}: {}", site, count);
        }
        println!();
    }

    println!(
        "Error pages: {} / {}",
        stats.error_pages(),
        stats.total_pages
    );
}
