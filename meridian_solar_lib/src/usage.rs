//! "Average daily use" from the usage chart page.

use meridian_portal::{Page, PortalSession};
use serde::Serialize;

use crate::patterns::PageRules;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageFindings {
    /// Whether the page looked like the usage chart at all.
    pub page_usable: bool,
    pub average_daily_use: Option<f64>,
}

/// A page is usable when it mentions any usage indicator or is long
/// enough to be a rendered chart.
pub fn page_is_usable(page: &Page, rules: &PageRules) -> bool {
    page.is_ok()
        && (page.keyword_hits(&rules.indicators) > 0 || page.body.len() > rules.min_body_len)
}

/// First match of the most specific pattern that matches.
pub fn find_average_daily_use(html: &str, rules: &PageRules) -> Option<f64> {
    rules.patterns.iter().find_map(|pattern| {
        let value = pattern.first_value(html)?;
        tracing::debug!("average daily use {} kWh via '{}'", value, pattern.name);
        Some(value)
    })
}

/// Fetches the usage page. Never fails; an unreachable page yields empty
/// findings.
pub async fn extract_usage(session: &mut PortalSession, rules: &PageRules) -> UsageFindings {
    let url = match session.urls().and_then(|urls| urls.page(&rules.path)) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("usage page unavailable: {}", e);
            return UsageFindings::default();
        }
    };

    let page = match session.fetch_page(&url, None).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("usage page {} failed: {}", url, e);
            return UsageFindings::default();
        }
    };

    if !page_is_usable(&page, rules) {
        tracing::info!("usage page {} has no usage data ({})", url, page.status);
        return UsageFindings::default();
    }

    let average_daily_use = find_average_daily_use(&page.body, rules);
    if average_daily_use.is_none() {
        tracing::info!("usage page reachable but no kWh figure found");
    }
    UsageFindings {
        page_usable: true,
        average_daily_use,
    }
}
