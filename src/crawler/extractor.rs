//! Record extraction driven by declarative selector rules
//!
//! This module handles:
//! - Compiling a site's `SelectorConfig` once into reusable CSS selectors
//! - Turning a fetched page into records, one per record element
//! - Finding the next page in the pagination chain
//!
//! There is one algorithm for every site; sites differ only in their rules.

use super::fetcher::FetchResult;
use super::frontier::PageRef;
use crate::config::{ExtractMode, FieldRule, SelectorConfig};
use crate::url::resolve_link;
use crate::{ConfigError, WalkError};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// One structured item extracted from a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    site_id: String,
    fields: BTreeMap<String, String>,
    source: PageRef,
}

impl Record {
    pub fn new(source: PageRef, fields: BTreeMap<String, String>) -> Self {
        Self {
            site_id: source.site_id().to_string(),
            fields,
            source,
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The page this record was extracted from
    pub fn source(&self) -> &PageRef {
        &self.source
    }
}

/// A field rule that could not be satisfied for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub url: String,
    /// Position of the record on its page
    pub record_index: usize,
    pub field: String,
    pub message: String,
}

/// Everything extracted from one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Records in document order
    pub records: Vec<Record>,
    pub next_refs: Vec<PageRef>,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug)]
enum ReadMode {
    Text,
    Html,
    Attr(String),
}

#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Option<Selector>,
    read: ReadMode,
    all: bool,
    join: String,
}

/// A site's selector rules, parsed once and shared by every extraction
#[derive(Debug)]
pub struct CompiledSelectors {
    record: Selector,
    fields: Vec<CompiledField>,
    next_page: Option<Selector>,
}

impl CompiledSelectors {
    /// Parses every selector in `config`
    ///
    /// # Returns
    ///
    /// * `Ok(CompiledSelectors)` - All selectors parsed
    /// * `Err(ConfigError)` - A selector is invalid or an attr rule names no attribute
    pub fn compile(config: &SelectorConfig) -> Result<Self, ConfigError> {
        let record = parse_selector("record", &config.record)?;

        let next_page = config
            .next_page
            .as_deref()
            .map(|s| parse_selector("next-page", s))
            .transpose()?;

        let fields = config
            .fields
            .iter()
            .map(compile_field)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            record,
            fields,
            next_page,
        })
    }
}

fn compile_field(rule: &FieldRule) -> Result<CompiledField, ConfigError> {
    let selector = rule
        .selector
        .as_deref()
        .map(|s| parse_selector(&rule.name, s))
        .transpose()?;

    let read = match rule.mode {
        ExtractMode::Text => ReadMode::Text,
        ExtractMode::Html => ReadMode::Html,
        ExtractMode::Attr => match rule.attr.as_deref() {
            Some(attr) if !attr.is_empty() => ReadMode::Attr(attr.to_string()),
            _ => {
                return Err(ConfigError::Validation(format!(
                    "field '{}' uses mode \"attr\" but names no attr",
                    rule.name
                )))
            }
        },
    };

    Ok(CompiledField {
        name: rule.name.clone(),
        selector,
        read,
        all: rule.all,
        join: rule.join.clone(),
    })
}

fn parse_selector(label: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", label, selector, e)))
}

impl CompiledField {
    /// Reads this field from a record element; None means the field is missing
    fn value(&self, element: ElementRef<'_>) -> Option<String> {
        match (&self.selector, self.all) {
            (None, _) => self.read(element),
            (Some(selector), false) => element.select(selector).next().and_then(|e| self.read(e)),
            (Some(selector), true) => {
                let values: Vec<String> = element
                    .select(selector)
                    .filter_map(|e| self.read(e))
                    .filter(|v| !v.is_empty())
                    .collect();
                Some(values.join(&self.join))
            }
        }
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        match &self.read {
            ReadMode::Text => Some(collapse_whitespace(element.text())),
            ReadMode::Html => Some(element.inner_html().trim().to_string()),
            ReadMode::Attr(name) => element.value().attr(name).map(|v| v.trim().to_string()),
        }
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts records and next-page references from a successful fetch
///
/// # Arguments
///
/// * `result` - A fetch result with status `Success`
/// * `selectors` - The compiled rules for the page's site
///
/// # Returns
///
/// * `Ok(Extraction)` - Records, next pages and warnings; zero records is not an error
/// * `Err(WalkError::Invariant)` - `result` is not a successful fetch
pub fn extract(result: &FetchResult, selectors: &CompiledSelectors) -> Result<Extraction, WalkError> {
    if !result.status.is_success() {
        return Err(WalkError::Invariant(format!(
            "extract called on {} for {}",
            result.status,
            result.page.url()
        )));
    }

    let body = result.body.as_deref().ok_or_else(|| {
        WalkError::Invariant(format!("successful fetch of {} has no body", result.page.url()))
    })?;

    let html = String::from_utf8_lossy(body);
    Ok(extract_html(&html, result.base_url(), &result.page, selectors))
}

/// Extracts from HTML text already in hand
///
/// Relative next-page links resolve against `base_url`.
pub fn extract_html(
    html: &str,
    base_url: &Url,
    page: &PageRef,
    selectors: &CompiledSelectors,
) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for (index, element) in document.select(&selectors.record).enumerate() {
        let mut fields = BTreeMap::new();

        for field in &selectors.fields {
            let value = match field.value(element) {
                Some(value) => value,
                None => {
                    extraction.warnings.push(ExtractionWarning {
                        url: page.url().to_string(),
                        record_index: index,
                        field: field.name.clone(),
                        message: format!("field '{}' not found", field.name),
                    });
                    String::new()
                }
            };
            fields.insert(field.name.clone(), value);
        }

        extraction.records.push(Record::new(page.clone(), fields));
    }

    if let Some(next) = &selectors.next_page {
        extraction.next_refs.extend(next_page(&document, next, base_url, page));
    }

    extraction
}

/// First element matching the next-page selector with a usable `href`
fn next_page(document: &Html, selector: &Selector, base_url: &Url, page: &PageRef) -> Option<PageRef> {
    let url = document
        .select(selector)
        .filter_map(|e| e.value().attr("href"))
        .find_map(|href| resolve_link(href, base_url))?;

    match PageRef::new(page.site_id(), url, page.page_number().saturating_add(1)) {
        Ok(next) => Some(next),
        Err(e) => {
            tracing::debug!("Ignoring next link on {}: {}", page.url(), e);
            None
        }
    }
}
