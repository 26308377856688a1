//! Output module: where crawl results go
//!
//! This module handles:
//! - The `Sink` trait the coordinator writes records and checkpoints to
//! - A SQLite sink for real runs and an in-memory sink for embedding and tests
//! - Markdown summaries and database statistics

mod markdown;
mod memory;
mod sqlite_output;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use memory::{MemorySink, PageEntry};
pub use sqlite_output::SqliteSink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, PageReport, Sink, SinkError, SinkResult};
