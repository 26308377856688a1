//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: pending, in-flight, visited and failed pages plus the crawl phase
//! - `CrawlSnapshot`: the serializable checkpoint form of `CrawlState`
//! - `PageState`: the stored outcome of each completed page

mod crawl_state;
mod page_state;

// Re-export main types
pub use crawl_state::{CrawlPhase, CrawlSnapshot, CrawlState, FailedPage};
pub use page_state::PageState;
