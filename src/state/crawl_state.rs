//! Whole-crawl state owned by the coordinator
//!
//! `CrawlState` keeps every page in exactly one of pending, in-flight or
//! visited. The frontier holds pending and visited; this type adds the
//! in-flight set, the failures and the phase, and checks the moves between
//! them.

use crate::crawler::{FetchStatus, Frontier, FrontierSnapshot, PageRef};
use crate::WalkError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlPhase {
    Running,
    /// No pending or in-flight work; waiting one tick before finishing
    Draining,
    Done,
    Cancelled,
}

impl CrawlPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// A page that ended without a successful fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub page: PageRef,
    pub status: FetchStatus,
    pub attempts: u32,
}

/// Serializable image of a `CrawlState`, written at every checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSnapshot {
    pub pending: Vec<PageRef>,
    /// Pages that were being fetched; they are fetched again on resume
    pub in_flight: Vec<PageRef>,
    pub visited: Vec<String>,
    pub failed: Vec<FailedPage>,
    pub completed: bool,
    pub taken_at: DateTime<Utc>,
}

impl CrawlSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Pending, in-flight, visited and failed pages plus the crawl phase
#[derive(Debug)]
pub struct CrawlState {
    frontier: Frontier,
    in_flight: HashMap<String, PageRef>,
    failed: Vec<FailedPage>,
    phase: CrawlPhase,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlState {
    pub fn new() -> Self {
        Self {
            frontier: Frontier::new(),
            in_flight: HashMap::new(),
            failed: Vec::new(),
            phase: CrawlPhase::Running,
        }
    }

    /// Rebuilds state from a checkpoint
    ///
    /// Pages that were in flight when the snapshot was taken go back to the
    /// front of their queues; they never count as visited.
    pub fn restore(snapshot: CrawlSnapshot) -> Self {
        let mut frontier = Frontier::restore(FrontierSnapshot {
            pending: snapshot.pending,
            visited: snapshot.visited,
        });

        for page in snapshot.in_flight.into_iter().rev() {
            frontier.requeue_front(page);
        }

        Self {
            frontier,
            in_flight: HashMap::new(),
            failed: snapshot.failed,
            phase: CrawlPhase::Running,
        }
    }

    /// Adds newly discovered pages
    ///
    /// Pages already pending, in flight or visited are dropped.
    ///
    /// # Returns
    ///
    /// The number of pages added to the frontier
    pub fn enqueue<I>(&mut self, pages: I) -> usize
    where
        I: IntoIterator<Item = PageRef>,
    {
        let in_flight = &self.in_flight;
        let fresh: Vec<PageRef> = pages
            .into_iter()
            .filter(|p| !in_flight.contains_key(p.dedup_key()))
            .collect();
        self.frontier.enqueue(fresh)
    }

    /// Moves up to `max_n` pages from pending to in flight
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<PageRef>)` - The pages now in flight
    /// * `Err(WalkError::Invariant)` - A dequeued key was already in flight
    pub fn dispatch(&mut self, max_n: usize) -> Result<Vec<PageRef>, WalkError> {
        let batch = self.frontier.dequeue_batch(max_n);

        for page in &batch {
            if self.frontier.is_visited(page.dedup_key()) {
                return Err(WalkError::Invariant(format!(
                    "{} dispatched after being visited",
                    page.dedup_key()
                )));
            }
            if self
                .in_flight
                .insert(page.dedup_key().to_string(), page.clone())
                .is_some()
            {
                return Err(WalkError::Invariant(format!(
                    "{} is already in flight",
                    page.dedup_key()
                )));
            }
        }

        Ok(batch)
    }

    /// Moves a page from in flight to visited
    ///
    /// # Returns
    ///
    /// * `Ok(PageRef)` - The completed page
    /// * `Err(WalkError::Invariant)` - The key was not in flight
    pub fn complete(&mut self, key: &str) -> Result<PageRef, WalkError> {
        let page = self
            .in_flight
            .remove(key)
            .ok_or_else(|| WalkError::Invariant(format!("{} completed but was not in flight", key)))?;

        self.frontier.mark_visited(key);
        Ok(page)
    }

    /// Records a completed page as failed
    pub fn record_failure(&mut self, failure: FailedPage) {
        self.failed.push(failure);
    }

    /// Drops pending pages of sites not in `sites`
    pub fn retain_sites(&mut self, sites: &HashSet<&str>) -> usize {
        self.frontier.retain_sites(sites)
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Sets the phase, returning the previous one
    pub fn set_phase(&mut self, phase: CrawlPhase) -> CrawlPhase {
        std::mem::replace(&mut self.phase, phase)
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn failed(&self) -> &[FailedPage] {
        &self.failed
    }

    /// True when nothing is pending and nothing is in flight
    pub fn is_idle(&self) -> bool {
        self.frontier.is_empty() && self.in_flight.is_empty()
    }

    pub fn snapshot(&self) -> CrawlSnapshot {
        let frontier = self.frontier.snapshot();

        let mut in_flight: Vec<PageRef> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| {
            (a.site_id(), a.page_number(), a.dedup_key()).cmp(&(
                b.site_id(),
                b.page_number(),
                b.dedup_key(),
            ))
        });

        CrawlSnapshot {
            pending: frontier.pending,
            in_flight,
            visited: frontier.visited,
            failed: self.failed.clone(),
            completed: self.phase == CrawlPhase::Done,
            taken_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn page(n: u32) -> PageRef {
        PageRef::new(
            "quotes",
            Url::parse(&format!("https://quotes.example.com/page/{}/", n)).unwrap(),
            n,
        )
        .unwrap()
    }

    /// Counts how many of the three sets contain `key`
    fn membership(state: &CrawlState, key: &str) -> usize {
        [
            state.frontier().is_pending(key),
            state.is_in_flight(key),
            state.frontier().is_visited(key),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    #[test]
    fn test_page_moves_through_sets() {
        let mut state = CrawlState::new();
        let p = page(1);

        state.enqueue(vec![p.clone()]);
        assert!(state.frontier().is_pending(p.dedup_key()));
        assert_eq!(membership(&state, p.dedup_key()), 1);

        state.dispatch(4).unwrap();
        assert!(state.is_in_flight(p.dedup_key()));
        assert_eq!(membership(&state, p.dedup_key()), 1);

        state.complete(p.dedup_key()).unwrap();
        assert!(state.frontier().is_visited(p.dedup_key()));
        assert_eq!(membership(&state, p.dedup_key()), 1);
        assert!(state.is_idle());
    }

    #[test]
    fn test_enqueue_in_flight_is_dropped() {
        let mut state = CrawlState::new();
        state.enqueue(vec![page(1)]);
        state.dispatch(1).unwrap();

        assert_eq!(state.enqueue(vec![page(1)]), 0);
        assert_eq!(membership(&state, page(1).dedup_key()), 1);
    }

    #[test]
    fn test_enqueue_visited_is_dropped() {
        let mut state = CrawlState::new();
        state.enqueue(vec![page(1)]);
        state.dispatch(1).unwrap();
        state.complete(page(1).dedup_key()).unwrap();

        assert_eq!(state.enqueue(vec![page(1)]), 0);
        assert!(state.frontier().is_empty());
    }

    #[test]
    fn test_complete_unknown_key_is_invariant_error() {
        let mut state = CrawlState::new();
        let result = state.complete("https://quotes.example.com/page/1");
        assert!(matches!(result, Err(WalkError::Invariant(_))));
    }

    #[test]
    fn test_dispatch_respects_limit() {
        let mut state = CrawlState::new();
        state.enqueue((1..=5).map(page));

        assert_eq!(state.dispatch(2).unwrap().len(), 2);
        assert_eq!(state.in_flight_len(), 2);
        assert_eq!(state.frontier().len(), 3);
    }

    #[test]
    fn test_snapshot_restore_requeues_in_flight() {
        let mut state = CrawlState::new();
        state.enqueue((1..=4).map(page));

        let dispatched = state.dispatch(2).unwrap();
        state.complete(dispatched[0].dedup_key()).unwrap();
        state.record_failure(FailedPage {
            page: dispatched[0].clone(),
            status: FetchStatus::HttpError(404),
            attempts: 1,
        });

        let json = state.snapshot().to_json().unwrap();
        let snapshot = CrawlSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot.in_flight, vec![page(2)]);
        assert!(!snapshot.completed);

        let mut restored = CrawlState::restore(snapshot);
        assert_eq!(restored.failed().len(), 1);
        assert!(restored.frontier().is_visited(page(1).dedup_key()));

        let order: Vec<u32> = restored
            .dispatch(10)
            .unwrap()
            .iter()
            .map(|p| p.page_number())
            .collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = CrawlState::new();
        assert_eq!(state.phase(), CrawlPhase::Running);

        assert_eq!(state.set_phase(CrawlPhase::Draining), CrawlPhase::Running);
        assert_eq!(state.set_phase(CrawlPhase::Done), CrawlPhase::Draining);
        assert!(state.phase().is_terminal());
        assert!(state.snapshot().completed);
    }
}
