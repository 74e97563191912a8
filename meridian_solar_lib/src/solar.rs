//! Feed-in report page scraping. Informational: nothing here feeds the
//! published reading, but the matches and export links help when the
//! portal changes shape.

use std::collections::BTreeMap;

use meridian_portal::PortalSession;
use regex::Regex;
use serde::Serialize;

use crate::patterns::PageRules;
use crate::usage::page_is_usable;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SolarFindings {
    pub page_usable: bool,
    /// Pattern name to every value it matched, in page order.
    pub matches: BTreeMap<String, Vec<f64>>,
    /// Export-looking links on the page.
    pub csv_links: Vec<String>,
}

/// Every match of every pattern. Patterns without matches are left out.
pub fn scan_solar_values(html: &str, rules: &PageRules) -> BTreeMap<String, Vec<f64>> {
    rules
        .patterns
        .iter()
        .filter_map(|pattern| {
            let values: Vec<f64> = pattern.values(html).collect();
            (!values.is_empty()).then(|| (pattern.name.clone(), values))
        })
        .collect()
}

/// Distinct link targets captured by `patterns`, in page order.
pub fn scan_links(html: &str, patterns: &[Regex]) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for re in patterns {
        for link in re
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
        {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    links
}

/// Fetches the feed-in report. Never fails.
pub async fn extract_solar(
    session: &mut PortalSession,
    rules: &PageRules,
    link_patterns: &[Regex],
) -> SolarFindings {
    let url = match session.urls().and_then(|urls| urls.page(&rules.path)) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("feed-in report unavailable: {}", e);
            return SolarFindings::default();
        }
    };

    let page = match session.fetch_page(&url, None).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("feed-in report {} failed: {}", url, e);
            return SolarFindings::default();
        }
    };

    if !page_is_usable(&page, rules) {
        tracing::info!("feed-in report {} has no solar data ({})", url, page.status);
        return SolarFindings::default();
    }

    let findings = SolarFindings {
        page_usable: true,
        matches: scan_solar_values(&page.body, rules),
        csv_links: scan_links(&page.body, link_patterns),
    };
    tracing::debug!(
        "feed-in report: {} pattern groups, {} export links",
        findings.matches.len(),
        findings.csv_links.len()
    );
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::ExtractionPatterns;

    #[test]
    fn test_all_matches_are_kept() {
        let rules = ExtractionPatterns::embedded().unwrap().solar;
        let html = "<p>Feed-in: 4.2</p><p>Total: 12.5</p><td>1.1 kWh</td><td>2.2 kWh</td>";
        let matches = scan_solar_values(html, &rules);

        assert_eq!(matches["kwh"], vec![1.1, 2.2]);
        assert_eq!(matches["feed_in"], vec![4.2]);
        assert_eq!(matches["total"], vec![12.5]);
        assert!(!matches.contains_key("generation"));
    }

    #[test]
    fn test_export_links_deduplicated() {
        let patterns = ExtractionPatterns::embedded().unwrap().csv_links;
        let html = r#"<a href="/feed_in_report.csv">CSV</a>
            <a href="/feed_in_report/download">Download</a>
            <a href='/feed_in_report.csv'>again</a>"#;
        assert_eq!(
            scan_links(html, &patterns),
            vec!["/feed_in_report.csv", "/feed_in_report/download"]
        );
    }
}
