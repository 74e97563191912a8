//! Tariff extraction from the portal's HTML pages.
//!
//! Pages are scanned in order and scanning stops at the first page with
//! any plausible candidate. The most frequent candidate on that page is
//! the rate; ties go to the one seen first.

use meridian_portal::PortalSession;
use serde::Serialize;
use url::Url;

use crate::patterns::RateRules;

/// A plausible rate found on a page, already in dollars per kWh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateCandidate {
    pub value: f64,
    pub source_page: String,
}

/// Result of a rate scan. `found` is false when the fallback was used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateQuote {
    pub current_rate: f64,
    pub next_rate: f64,
    pub found: bool,
}

impl RateQuote {
    pub fn fallback(rules: &RateRules) -> Self {
        Self {
            current_rate: rules.fallback,
            next_rate: rules.fallback,
            found: false,
        }
    }

    // The portal shows no separate next-period tariff.
    fn single(rate: f64) -> Self {
        Self {
            current_rate: rate,
            next_rate: rate,
            found: true,
        }
    }
}

/// Converts cents to dollars when the value is above the minor-unit
/// threshold, then keeps it only if it falls in the plausible band.
pub fn normalize_rate(raw: f64, rules: &RateRules) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let value = if raw > rules.minor_unit_threshold {
        raw / 100.0
    } else {
        raw
    };
    (rules.plausible_min..=rules.plausible_max)
        .contains(&value)
        .then_some(value)
}

/// All plausible candidates on one page, pattern by pattern.
pub fn scan_rates(html: &str, source_page: &str, rules: &RateRules) -> Vec<RateCandidate> {
    let mut candidates = Vec::new();
    for pattern in &rules.patterns {
        for raw in pattern.values(html) {
            if let Some(value) = normalize_rate(raw, rules) {
                tracing::debug!("rate {} from '{}' on {}", value, pattern.name, source_page);
                candidates.push(RateCandidate {
                    value,
                    source_page: source_page.to_string(),
                });
            }
        }
    }
    candidates
}

/// Most frequent value; on a tie the earliest candidate wins.
pub fn select_rate(candidates: &[RateCandidate]) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for candidate in candidates {
        match counts.iter_mut().find(|(v, _)| *v == candidate.value) {
            Some((_, n)) => *n += 1,
            None => counts.push((candidate.value, 1)),
        }
    }

    let mut best: Option<(f64, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

fn rate_pages(session: &PortalSession, rules: &RateRules) -> Vec<Url> {
    let Ok(urls) = session.urls() else {
        return Vec::new();
    };
    let mut pages = vec![urls.dashboard.clone()];
    for path in &rules.pages {
        match urls.page(path) {
            Ok(url) => pages.push(url),
            Err(e) => tracing::debug!("skipping rate page {}: {}", path, e),
        }
    }
    pages
}

/// Scans the rate pages. Never fails: any problem yields the fallback.
pub async fn extract_rates(session: &mut PortalSession, rules: &RateRules) -> RateQuote {
    for url in rate_pages(session, rules) {
        let page = match session.fetch_page(&url, None).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!("rate page {} failed: {}", url, e);
                if !session.is_logged_in() {
                    break;
                }
                continue;
            }
        };
        if !page.is_ok() {
            tracing::debug!("rate page {} answered {}", url, page.status);
            continue;
        }

        let candidates = scan_rates(&page.body, url.as_str(), rules);
        if let Some(rate) = select_rate(&candidates) {
            tracing::info!(
                "current rate {} $/kWh from {} ({} candidates)",
                rate,
                url,
                candidates.len()
            );
            return RateQuote::single(rate);
        }
    }

    tracing::warn!("no plausible rate found, using fallback {}", rules.fallback);
    RateQuote::fallback(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::ExtractionPatterns;

    fn rules() -> RateRules {
        ExtractionPatterns::embedded().unwrap().rates
    }

    fn candidates(values: &[f64]) -> Vec<RateCandidate> {
        values
            .iter()
            .map(|v| RateCandidate {
                value: *v,
                source_page: "test".into(),
            })
            .collect()
    }

    #[test]
    fn test_cents_normalized_to_dollars() {
        assert_eq!(normalize_rate(28.0, &rules()), Some(0.28));
        assert_eq!(normalize_rate(0.28, &rules()), Some(0.28));
    }

    #[test]
    fn test_normalization_examples() {
        assert_eq!(normalize_rate(25.5, &rules()), Some(0.255));
        assert_eq!(normalize_rate(0.30, &rules()), Some(0.30));
        assert_eq!(normalize_rate(75.0, &rules()), None);
    }

    #[test]
    fn test_band_edges_inclusive() {
        assert_eq!(normalize_rate(0.15, &rules()), Some(0.15));
        assert_eq!(normalize_rate(0.50, &rules()), Some(0.50));
        assert_eq!(normalize_rate(15.0, &rules()), Some(0.15));
        assert_eq!(normalize_rate(50.0, &rules()), Some(0.50));
    }

    #[test]
    fn test_out_of_band_rejected() {
        assert_eq!(normalize_rate(0.149, &rules()), None);
        assert_eq!(normalize_rate(0.51, &rules()), None);
        assert_eq!(normalize_rate(5.0, &rules()), None);
        assert_eq!(normalize_rate(120.0, &rules()), None);
        assert_eq!(normalize_rate(f64::NAN, &rules()), None);
    }

    #[test]
    fn test_mode_wins() {
        assert_eq!(select_rate(&candidates(&[0.28, 0.31, 0.31])), Some(0.31));
    }

    #[test]
    fn test_repeated_value_selected() {
        assert_eq!(select_rate(&candidates(&[0.25, 0.30, 0.25, 0.25])), Some(0.25));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        assert_eq!(select_rate(&candidates(&[0.28, 0.31, 0.31, 0.28])), Some(0.28));
        assert_eq!(select_rate(&candidates(&[0.40, 0.20])), Some(0.40));
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(select_rate(&[]), None);
    }

    #[test]
    fn test_scan_mixed_units() {
        let html = r#"<div>Anytime: 28.5c/kWh</div><p>Rate: $0.285</p><td>0.285</td>"#;
        let found = scan_rates(html, "dashboard", &rules());
        assert!(found.len() >= 3);
        assert!(found.iter().all(|c| c.value == 0.285));
        assert_eq!(select_rate(&found), Some(0.285));
    }

    #[test]
    fn test_scan_ignores_implausible_numbers() {
        let html = "<p>Account 12345678</p><td>3</td><p>Total: $142.50</p>";
        assert!(scan_rates(html, "billing", &rules()).is_empty());
    }

    #[test]
    fn test_fallback_quote() {
        let quote = RateQuote::fallback(&rules());
        assert_eq!(quote.current_rate, 0.25);
        assert_eq!(quote.next_rate, 0.25);
        assert!(!quote.found);
    }
}
