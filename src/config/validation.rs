use std::collections::HashSet;

use crate::config::types::{
    Config, CrawlerConfig, ExtractMode, FetchConfig, OutputConfig, SelectorConfig, SiteConfig,
    UserAgentConfig,
};
use crate::crawler::CompiledSelectors;
use crate::ConfigError;
use url::Url;

/// Placeholder in start URLs that expands to a page number
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Upper bound for the global concurrency budget
pub const MAX_CONCURRENCY: usize = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_sites(&config.sites)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.per_host_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "per_host_concurrency must be >= 1, got {}",
            config.per_host_concurrency
        )));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Also used as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only letters, digits, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(config.summary_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates site entries and their selectors
fn validate_sites(sites: &[SiteConfig]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[site]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for site in sites {
        if site.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "site id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(site.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate site id '{}'",
                site.id
            )));
        }

        validate_start_urls(site)?;
        validate_selectors(&site.id, &site.selectors)?;
    }

    Ok(())
}

/// Validates a site's start URLs and page template settings
fn validate_start_urls(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.start_urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "site '{}' must have at least one start URL",
            site.id
        )));
    }

    let mut templated = false;
    for raw in &site.start_urls {
        templated |= raw.contains(PAGE_PLACEHOLDER);
        let candidate = raw.replace(PAGE_PLACEHOLDER, "1");

        let url = Url::parse(&candidate).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", raw, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Start URL '{}' must use http or https",
                raw
            )));
        }
    }

    match site.start_pages {
        Some(0) => Err(ConfigError::Validation(format!(
            "site '{}': start_pages must be >= 1",
            site.id
        ))),
        Some(_) if !templated => Err(ConfigError::Validation(format!(
            "site '{}': start_pages requires a start URL containing {}",
            site.id, PAGE_PLACEHOLDER
        ))),
        _ => match site.max_pages {
            Some(0) => Err(ConfigError::Validation(format!(
                "site '{}': max_pages must be >= 1",
                site.id
            ))),
            _ => Ok(()),
        },
    }
}

/// Validates field rules and checks that every selector compiles
fn validate_selectors(site_id: &str, selectors: &SelectorConfig) -> Result<(), ConfigError> {
    if selectors.fields.is_empty() {
        return Err(ConfigError::Validation(format!(
            "site '{}' must define at least one field",
            site_id
        )));
    }

    let mut names = HashSet::new();
    for field in &selectors.fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "site '{}': field name cannot be empty",
                site_id
            )));
        }

        if !names.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "site '{}': duplicate field '{}'",
                site_id, field.name
            )));
        }

        match (field.mode, field.attr.as_deref()) {
            (ExtractMode::Attr, None) | (ExtractMode::Attr, Some("")) => {
                return Err(ConfigError::Validation(format!(
                    "site '{}': field '{}' uses mode \"attr\" but names no attr",
                    site_id, field.name
                )));
            }
            (ExtractMode::Text | ExtractMode::Html, Some(_)) => {
                return Err(ConfigError::Validation(format!(
                    "site '{}': field '{}' sets attr without mode \"attr\"",
                    site_id, field.name
                )));
            }
            _ => {}
        }
    }

    CompiledSelectors::compile(selectors)
        .map_err(|e| ConfigError::InvalidSelector(format!("site '{}': {}", site_id, e)))?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
