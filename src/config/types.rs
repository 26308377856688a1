use serde::Deserialize;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Main configuration structure for Pagewalk
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Restricts the configuration to the named sites
    ///
    /// An empty selection keeps every site. Unknown ids are an error so a
    /// typo on the command line does not silently crawl nothing.
    pub fn select_sites(&mut self, ids: &[String]) -> ConfigResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        for id in ids {
            if !self.sites.iter().any(|site| &site.id == id) {
                return Err(ConfigError::UnknownSite(id.clone()));
            }
        }

        self.sites.retain(|site| ids.contains(&site.id));
        Ok(())
    }

    /// Looks up a site by id
    pub fn site(&self, id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.id == id)
    }
}

/// Crawl coordinator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Global concurrency budget: maximum pages in flight at once
    pub concurrency: usize,

    /// Number of completed pages between checkpoints
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,
}

/// Fetch behaviour shared by every request
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-attempt timeout (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Maximum concurrent requests against one host
    #[serde(
        rename = "per-host-concurrency",
        default = "default_per_host_concurrency"
    )]
    pub per_host_concurrency: usize,

    /// Honour robots.txt rules
    #[serde(rename = "respect-robots", default = "default_respect_robots")]
    pub respect_robots: bool,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            per_host_concurrency: default_per_host_concurrency(),
            respect_robots: default_respect_robots(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `Name/Version (+URL; EMAIL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown summary file, written after each crawl
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

/// One paginated site to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Stable identifier, stored with every page and record
    pub id: String,

    /// Start URLs; a `{page}` placeholder expands to pages `1..=start-pages`
    #[serde(rename = "start-urls")]
    pub start_urls: Vec<String>,

    #[serde(rename = "start-pages", default)]
    pub start_pages: Option<u32>,

    /// Highest page number that will be fetched for this site
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    pub selectors: SelectorConfig,
}

/// Declarative extraction rules for one site
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Selector matching one element per record
    pub record: String,

    /// Selector for the link to the next listing page
    #[serde(rename = "next-page", default)]
    pub next_page: Option<String>,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldRule>,
}

/// How one record field is pulled out of a record element
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub name: String,

    /// Selector relative to the record element; absent means the element itself
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub mode: ExtractMode,

    /// Attribute name, required for `mode = "attr"`
    #[serde(default)]
    pub attr: Option<String>,

    /// Collect every match instead of the first
    #[serde(default)]
    pub all: bool,

    /// Separator for multi-valued fields
    #[serde(default = "default_join")]
    pub join: String,
}

/// What a field rule reads from a matched element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Text content with whitespace collapsed
    #[default]
    Text,
    /// A single attribute value
    Attr,
    /// Inner HTML
    Html,
}

fn default_checkpoint_interval() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_per_host_concurrency() -> usize {
    2
}

fn default_respect_robots() -> bool {
    true
}

fn default_join() -> String {
    ", ".to_string()
}
