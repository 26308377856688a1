//! Configuration module for Pagewalk
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! A configuration names the sites to crawl, the selector rules that turn
//! their pages into records, and the fetch and concurrency limits.
//!
//! # Example
//!
//! ```no_run
//! use pagewalk::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("demos/quotes.toml")).unwrap();
//! println!("Concurrency budget: {}", config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, ExtractMode, FetchConfig, FieldRule, OutputConfig, SelectorConfig,
    SiteConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{validate, MAX_CONCURRENCY, PAGE_PLACEHOLDER};
