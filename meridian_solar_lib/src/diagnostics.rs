//! Diagnostics snapshot and the on-demand portal self-test.

use chrono::{DateTime, Utc};
use meridian_portal::{PortalSession, PortalUrls};
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::patterns::ExtractionPatterns;
use crate::reading::Tier;
use crate::solar::{extract_solar, scan_links};
use crate::usage::extract_usage;

/// Endpoint hints reported from the dashboard.
pub const MAX_DATA_ENDPOINTS: usize = 10;

/// Result of walking every portal step once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelfTestReport {
    pub endpoint_discovery: bool,
    pub authentication: bool,
    pub dashboard_access: bool,
    pub usage_data: bool,
    pub solar_data: bool,
    pub csv_download: bool,
    /// URLs referenced from the dashboard markup that look like data
    /// sources. Useful when the portal moves things around.
    pub data_endpoints: Vec<String>,
}

impl SelfTestReport {
    pub fn checks(&self) -> [(&'static str, bool); 6] {
        [
            ("endpoint_discovery", self.endpoint_discovery),
            ("authentication", self.authentication),
            ("dashboard_access", self.dashboard_access),
            ("usage_data", self.usage_data),
            ("solar_data", self.solar_data),
            ("csv_download", self.csv_download),
        ]
    }

    pub fn passed(&self) -> usize {
        self.checks().iter().filter(|(_, ok)| *ok).count()
    }
}

/// Redacted view of the coordinator and session. Never includes the
/// password, cookies or the CSRF token.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub username: String,
    pub logged_in: bool,
    pub session_closed: bool,
    pub retry_count: u32,
    pub urls: Option<PortalUrls>,
    pub form_action: Option<Url>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_tier: Option<Tier>,
    pub self_test: Option<SelfTestReport>,
}

impl DiagnosticsSnapshot {
    pub fn capture(
        session: &PortalSession,
        last_success: Option<DateTime<Utc>>,
        last_tier: Option<Tier>,
    ) -> Self {
        let state = session.state();
        Self {
            username: session.credentials().masked_username(),
            logged_in: state.logged_in,
            session_closed: session.is_closed(),
            retry_count: state.retry_count,
            urls: state.urls.clone(),
            form_action: state.form_action.clone(),
            last_success,
            last_tier,
            self_test: None,
        }
    }
}

/// Data-looking URLs in `html`: anything on the portal's domain, rooted at
/// `/`, or mentioning an api/data path. At most [`MAX_DATA_ENDPOINTS`].
pub fn scan_data_endpoints(html: &str, patterns: &[Regex]) -> Vec<String> {
    scan_links(html, patterns)
        .into_iter()
        .filter(|link| {
            let lower = link.to_lowercase();
            lower.contains("meridian")
                || lower.starts_with('/')
                || lower.contains("api")
                || lower.contains("data")
        })
        .take(MAX_DATA_ENDPOINTS)
        .collect()
}

/// Runs discovery, a fresh login, the dashboard probe, both data pages and
/// the export download. Later steps are skipped once authentication fails,
/// and the export is only attempted when the feed-in report answered.
pub async fn run_self_test(
    session: &mut PortalSession,
    patterns: &ExtractionPatterns,
) -> SelfTestReport {
    let mut report = SelfTestReport::default();

    match session.discover_login_page().await {
        Ok(url) => {
            tracing::info!("self-test: login page at {}", url);
            report.endpoint_discovery = true;
        }
        Err(e) => {
            tracing::warn!("self-test: discovery failed: {}", e);
            return report;
        }
    }

    if let Err(e) = session.authenticate().await {
        tracing::warn!("self-test: authentication failed: {}", e);
        return report;
    }
    report.authentication = true;
    session.begin_cycle();

    if let Ok(dashboard) = session.urls().map(|u| u.dashboard.clone()) {
        match session.fetch_page(&dashboard, None).await {
            Ok(page) if page.is_ok() => {
                report.dashboard_access =
                    page.keyword_hits(&patterns.portal.dashboard_keywords) > 0;
                report.data_endpoints = scan_data_endpoints(&page.body, &patterns.endpoints);
            }
            Ok(page) => tracing::warn!("self-test: dashboard answered {}", page.status),
            Err(e) => tracing::warn!("self-test: dashboard failed: {}", e),
        }
    }

    report.usage_data = extract_usage(session, &patterns.usage).await.page_usable;
    report.solar_data = extract_solar(session, &patterns.solar, &patterns.csv_links)
        .await
        .page_usable;

    if report.solar_data {
        match session.download_export().await {
            Ok(text) => {
                tracing::info!("self-test: export downloaded ({} bytes)", text.len());
                report.csv_download = true;
            }
            Err(e) => tracing::warn!("self-test: export failed: {}", e),
        }
    }

    tracing::info!("self-test: {}/6 checks passed", report.passed());
    report
}
