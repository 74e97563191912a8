//! Extraction pattern table.
//!
//! Every regex, keyword list and numeric band the scraper keys on lives in
//! `seed_data/extraction_patterns.yml`, embedded at compile time. A copy of
//! that file can be loaded at runtime to patch portal drift.

use std::path::Path;

use meridian_portal::PortalMarkers;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;

const EMBEDDED_PATTERNS: &str = include_str!("../../seed_data/extraction_patterns.yml");

/// Error types for pattern table loading.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Failed to parse pattern YAML: {0}")]
    YamlParse(#[from] serde_yml::Error),
    #[error("Failed to read pattern file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Pattern '{name}' does not compile: {source}")]
    Regex { name: String, source: regex::Error },
    #[error("Invalid pattern table: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug)]
struct PatternFile {
    portal: PortalSection,
    rates: RateSection,
    usage: PageSection,
    solar: PageSection,
    #[serde(default)]
    endpoints: Vec<String>,
    #[serde(default)]
    csv_links: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct PortalSection {
    csrf_token: Vec<String>,
    form_action: String,
    login_keywords: Vec<String>,
    min_login_keywords: usize,
    dashboard_keywords: Vec<String>,
    redirect_success: Vec<String>,
    body_success: Vec<String>,
    body_failure: Vec<String>,
    csv_header_tokens: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct RateSection {
    pages: Vec<String>,
    minor_unit_threshold: f64,
    plausible_min: f64,
    plausible_max: f64,
    fallback: f64,
    patterns: Vec<PatternEntry>,
}

#[derive(Deserialize, Debug)]
struct PageSection {
    path: String,
    min_body_len: usize,
    indicators: Vec<String>,
    patterns: Vec<PatternEntry>,
}

#[derive(Deserialize, Debug)]
struct PatternEntry {
    name: String,
    pattern: String,
}

/// A compiled pattern with the name it carries in the table.
#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub name: String,
    pub regex: Regex,
}

impl NamedPattern {
    /// Every capture-group-1 value in `text` that parses as a finite float.
    pub fn values<'a>(&'a self, text: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.regex
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    pub fn first_value(&self, text: &str) -> Option<f64> {
        self.values(text).next()
    }
}

/// Tariff scanning rules.
#[derive(Debug, Clone)]
pub struct RateRules {
    /// Scanned after the dashboard, in order.
    pub pages: Vec<String>,
    pub patterns: Vec<NamedPattern>,
    /// Values above this are taken to be cents.
    pub minor_unit_threshold: f64,
    pub plausible_min: f64,
    pub plausible_max: f64,
    pub fallback: f64,
}

/// Rules for a single scraped page (usage chart, feed-in report).
#[derive(Debug, Clone)]
pub struct PageRules {
    pub path: String,
    /// A page longer than this is treated as usable even without indicators.
    pub min_body_len: usize,
    pub indicators: Vec<String>,
    pub patterns: Vec<NamedPattern>,
}

/// The compiled pattern table.
#[derive(Debug, Clone)]
pub struct ExtractionPatterns {
    pub portal: PortalMarkers,
    pub rates: RateRules,
    pub usage: PageRules,
    pub solar: PageRules,
    pub endpoints: Vec<Regex>,
    pub csv_links: Vec<Regex>,
}

impl ExtractionPatterns {
    /// Parse and compile a pattern table from YAML content.
    pub fn parse(yaml_content: &str) -> Result<Self, PatternError> {
        let file: PatternFile = serde_yml::from_str(yaml_content)?;

        let rates = &file.rates;
        if rates.patterns.is_empty() {
            return Err(PatternError::Invalid("rates.patterns is empty".into()));
        }
        if !(rates.plausible_min < rates.plausible_max) {
            return Err(PatternError::Invalid(format!(
                "rate band {}..{} is empty",
                rates.plausible_min, rates.plausible_max
            )));
        }
        if !rates.fallback.is_finite() || rates.fallback < 0.0 {
            return Err(PatternError::Invalid(format!(
                "fallback rate {} is not a usable price",
                rates.fallback
            )));
        }

        let portal = PortalMarkers {
            csrf_patterns: compile_list("portal.csrf_token", &file.portal.csrf_token)?,
            form_action: compile("portal.form_action", &file.portal.form_action)?,
            login_keywords: file.portal.login_keywords,
            min_login_keywords: file.portal.min_login_keywords,
            dashboard_keywords: file.portal.dashboard_keywords,
            redirect_success: file.portal.redirect_success,
            body_success: file.portal.body_success,
            body_failure: file.portal.body_failure,
            csv_header_tokens: file.portal.csv_header_tokens,
        };

        Ok(Self {
            portal,
            rates: RateRules {
                pages: file.rates.pages,
                patterns: compile_named(&file.rates.patterns)?,
                minor_unit_threshold: file.rates.minor_unit_threshold,
                plausible_min: file.rates.plausible_min,
                plausible_max: file.rates.plausible_max,
                fallback: file.rates.fallback,
            },
            usage: page_rules(file.usage)?,
            solar: page_rules(file.solar)?,
            endpoints: compile_list("endpoints", &file.endpoints)?,
            csv_links: compile_list("csv_links", &file.csv_links)?,
        })
    }

    /// Load the table embedded at compile time.
    pub fn embedded() -> Result<Self, PatternError> {
        Self::parse(EMBEDDED_PATTERNS)
    }

    /// Load a table from disk, replacing the embedded one entirely.
    pub fn from_file(path: &Path) -> Result<Self, PatternError> {
        let content = std::fs::read_to_string(path).map_err(|source| PatternError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }
}

fn page_rules(section: PageSection) -> Result<PageRules, PatternError> {
    Ok(PageRules {
        path: section.path,
        min_body_len: section.min_body_len,
        indicators: section.indicators,
        patterns: compile_named(&section.patterns)?,
    })
}

fn compile(name: &str, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::Regex {
            name: name.to_string(),
            source,
        })
}

fn compile_list(name: &str, patterns: &[String]) -> Result<Vec<Regex>, PatternError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| compile(&format!("{}[{}]", name, i), p))
        .collect()
}

fn compile_named(entries: &[PatternEntry]) -> Result<Vec<NamedPattern>, PatternError> {
    entries
        .iter()
        .map(|e| {
            Ok(NamedPattern {
                name: e.name.clone(),
                regex: compile(&e.name, &e.pattern)?,
            })
        })
        .collect()
}
