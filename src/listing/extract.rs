//! Listing extraction strategies
//!
//! Listing pages are the fragile edge of the pipeline: their markup changes
//! without notice. Extraction is therefore a strategy trait, and the default
//! implementation layers three approaches the way the page has historically
//! needed them:
//!
//! 1. JSON data embedded in `<script>` tags (most stable when present)
//! 2. CSS-selector scans over a list of candidate selectors
//! 3. Bare arxiv links anywhere in the page (last resort)
//!
//! The first strategy that yields records wins.

use crate::error::FetchError;
use crate::types::{PaperId, PaperRecord};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

// Static patterns are literals; a parse failure here is a programming error.

/// Arxiv-style paper id (e.g. `2401.12345`)
#[allow(clippy::expect_used)]
static PAPER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}\.\d{4,5})").expect("valid literal regex"));

/// Listing-entry path with a trailing paper id (e.g. `/papers/2401.12345`)
#[allow(clippy::expect_used)]
static PAPERS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/papers/(\d{4}\.\d{4,5})").expect("valid literal regex"));

/// Smallest JSON object in a script body that mentions "papers"
#[allow(clippy::expect_used)]
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"papers".*\}"#).expect("valid literal regex"));

/// Maximum recursion depth when searching embedded JSON structures
const MAX_JSON_DEPTH: usize = 10;

/// Candidate selectors tried in order against the listing page
const CANDIDATE_SELECTORS: &[&str] = &[
    "article",
    r#"div[class*="paper"]"#,
    r#"a[href*="/papers/"]"#,
    "section article",
    "main article",
];

/// Strategy for turning a fetched listing page into paper records
///
/// Implementations must be side-effect free; the fetcher owns the network.
pub trait ListingExtractor: Send + Sync {
    /// Extract paper records from the page HTML
    ///
    /// `date` is the listing date to stamp onto the records. An empty vec is
    /// a valid result (the fetcher decides whether that is an error).
    fn extract(&self, html: &str, date: NaiveDate) -> Result<Vec<PaperRecord>, FetchError>;
}

/// Default extraction strategy (embedded JSON → selectors → bare links)
#[derive(Debug, Default)]
pub struct DailyListingExtractor;

impl DailyListingExtractor {
    /// Create the default extractor
    pub fn new() -> Self {
        Self
    }

    fn extract_from_embedded_json(&self, doc: &Html, date: NaiveDate) -> Vec<PaperRecord> {
        let Some(script_sel) = parse_selector("script") else {
            return Vec::new();
        };

        for script in doc.select(&script_sel) {
            let text: String = script.text().collect();
            if !text.contains("papers") {
                continue;
            }

            let Some(m) = JSON_OBJECT_RE.find(&text) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(m.as_str()) else {
                continue;
            };

            let records = find_papers_in_json(&value, date, 0);
            if !records.is_empty() {
                tracing::debug!(count = records.len(), "Extracted papers from embedded JSON");
                return records;
            }
        }

        Vec::new()
    }

    fn extract_from_selectors(&self, doc: &Html, date: NaiveDate) -> Vec<PaperRecord> {
        for selector_str in CANDIDATE_SELECTORS {
            let Some(selector) = parse_selector(selector_str) else {
                continue;
            };

            let elements: Vec<ElementRef<'_>> = doc.select(&selector).collect();
            if elements.is_empty() {
                continue;
            }

            let records: Vec<PaperRecord> = elements
                .iter()
                .filter_map(|el| extract_from_element(*el, date))
                .collect();

            if !records.is_empty() {
                tracing::debug!(
                    selector = selector_str,
                    count = records.len(),
                    "Extracted papers via selector"
                );
                return records;
            }
        }

        Vec::new()
    }

    fn extract_from_arxiv_links(&self, doc: &Html, date: NaiveDate) -> Vec<PaperRecord> {
        let Some(link_sel) = parse_selector(r#"a[href*="arxiv.org"]"#) else {
            return Vec::new();
        };

        doc.select(&link_sel)
            .filter_map(|link| {
                let href = link.value().attr("href")?;
                let id = PAPER_ID_RE.captures(href)?.get(1)?.as_str().to_string();

                let text: String = link.text().collect::<String>().trim().to_string();
                let title = if text.is_empty() {
                    format!("Paper {id}")
                } else {
                    text
                };

                Some(record_for(id, title, Some(href.to_string()), date))
            })
            .collect()
    }
}

impl ListingExtractor for DailyListingExtractor {
    fn extract(&self, html: &str, date: NaiveDate) -> Result<Vec<PaperRecord>, FetchError> {
        let doc = Html::parse_document(html);

        let mut records = self.extract_from_embedded_json(&doc, date);
        if records.is_empty() {
            records = self.extract_from_selectors(&doc, date);
        }
        if records.is_empty() {
            records = self.extract_from_arxiv_links(&doc, date);
        }

        Ok(dedup_by_id(records))
    }
}

/// Parse a selector, dropping it on syntax errors instead of panicking
fn parse_selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Keep the first record for each id, preserving listing order
fn dedup_by_id(records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}

fn record_for(
    id: String,
    title: String,
    listing_url: Option<String>,
    date: NaiveDate,
) -> PaperRecord {
    PaperRecord {
        source_url: format!("https://arxiv.org/pdf/{id}.pdf"),
        id: PaperId::new(id),
        title,
        listing_url,
        listing_date: date,
    }
}

/// Pull title and paper link out of one listing element
///
/// The element may be a container (article, div) or the anchor itself.
fn extract_from_element(el: ElementRef<'_>, date: NaiveDate) -> Option<PaperRecord> {
    // Collect hrefs: the element's own if it is an anchor, else descendants'
    let mut hrefs: Vec<String> = Vec::new();
    if el.value().name() == "a" {
        if let Some(href) = el.value().attr("href") {
            hrefs.push(href.to_string());
        }
    } else if let Some(anchor_sel) = parse_selector("a[href]") {
        hrefs.extend(
            el.select(&anchor_sel)
                .filter_map(|a| a.value().attr("href").map(str::to_string)),
        );
    }

    let (id, listing_url) = hrefs.iter().find_map(|href| {
        if let Some(caps) = PAPERS_PATH_RE.captures(href) {
            Some((caps.get(1)?.as_str().to_string(), href.clone()))
        } else if href.contains("arxiv.org") {
            let caps = PAPER_ID_RE.captures(href)?;
            Some((caps.get(1)?.as_str().to_string(), href.clone()))
        } else {
            None
        }
    })?;

    let title = element_title(el).unwrap_or_else(|| format!("Paper {id}"));
    Some(record_for(id, title, Some(listing_url), date))
}

/// First non-empty heading or anchor text within an element
fn element_title(el: ElementRef<'_>) -> Option<String> {
    if el.value().name() == "a" {
        let text = el.text().collect::<String>().trim().to_string();
        return (!text.is_empty()).then_some(text);
    }

    for tag in ["h1", "h2", "h3", "h4", "h5", "a"] {
        let Some(selector) = parse_selector(tag) else {
            continue;
        };
        if let Some(found) = el.select(&selector).find_map(|t| {
            let text = t.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(text)
        }) {
            return Some(found);
        }
    }
    None
}

/// Recursively search an embedded JSON structure for a paper list
fn find_papers_in_json(value: &serde_json::Value, date: NaiveDate, depth: usize) -> Vec<PaperRecord> {
    if depth > MAX_JSON_DEPTH {
        return Vec::new();
    }

    match value {
        serde_json::Value::Object(map) => {
            if let Some(list) = map.get("papers") {
                let records = normalize_json_list(list, date);
                if !records.is_empty() {
                    return records;
                }
            }
            for nested in map.values() {
                let records = find_papers_in_json(nested, date, depth + 1);
                if !records.is_empty() {
                    return records;
                }
            }
            Vec::new()
        }
        serde_json::Value::Array(items) => {
            // An array of paper-shaped objects is itself a candidate list
            let records = normalize_json_list(value, date);
            if !records.is_empty() {
                return records;
            }
            for item in items {
                let records = find_papers_in_json(item, date, depth + 1);
                if !records.is_empty() {
                    return records;
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Normalize a JSON array of heterogeneous paper objects
fn normalize_json_list(value: &serde_json::Value, date: NaiveDate) -> Vec<PaperRecord> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| normalize_json_item(item, date))
        .collect()
}

/// Normalize one paper object, tolerating several field spellings
fn normalize_json_item(item: &serde_json::Value, date: NaiveDate) -> Option<PaperRecord> {
    let obj = item.as_object()?;

    let title = ["title", "name", "paper_title"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string);

    let mut id = ["arxiv_id", "paper_id", "id"].iter().find_map(|k| {
        let raw = obj.get(*k)?.as_str()?;
        PAPER_ID_RE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });

    let listing_url = ["url", "link", "href"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string);

    // No explicit id: try to pull one out of the URL
    if id.is_none()
        && let Some(url) = &listing_url
    {
        id = PAPER_ID_RE
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
    }

    let id = id?;
    let title = title.unwrap_or_else(|| format!("Paper {id}"));
    Some(record_for(id, title, listing_url, date))
}
