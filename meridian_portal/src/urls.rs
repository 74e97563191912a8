//! Portal address bookkeeping.
//!
//! The portal has moved between hosts and paths over time, so nothing is
//! hardcoded past the candidate list: every other address is derived from
//! whichever login page discovery lands on.

use serde::Serialize;
use url::Url;

use crate::PortalError;

/// Addresses probed, in order, when looking for the live login page.
pub const DEFAULT_CANDIDATE_URLS: &[&str] = &[
    "https://secure.meridianenergy.co.nz/customers/",
    "https://secure.meridianenergy.co.nz/login",
    "https://secure.meridianenergy.co.nz/",
    "https://www.meridianenergy.co.nz/login",
    "https://www.meridianenergy.co.nz/customers/login",
    "https://my.meridianenergy.co.nz/",
    "https://portal.meridianenergy.co.nz/",
];

/// Page holding the feed-in heatmap and the CSV export links.
pub const FEED_IN_REPORT_PATH: &str = "/feed_in_report";

/// Export locations tried in order; the first CSV-looking 200 wins.
pub const DEFAULT_EXPORT_PATHS: &[&str] = &[
    "/feed_in_report.csv",
    "/feed_in_report/download",
    "/feed_in_report/export",
    "/customers/feed_in_report.csv",
];

/// Addresses derived from the discovered login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortalUrls {
    pub base: Url,
    pub login: Url,
    pub dashboard: Url,
    pub usage: Url,
    pub billing: Url,
}

impl PortalUrls {
    /// Derives the portal addresses from the final (post-redirect) login
    /// URL: the last path segment is stripped and `/` appended.
    pub fn from_discovered(discovered: &Url) -> Result<Self, PortalError> {
        let mut trimmed = discovered.clone();
        trimmed.set_query(None);
        trimmed.set_fragment(None);
        let raw = trimmed.as_str();
        let head = raw.rsplit_once('/').map(|(head, _)| head).unwrap_or(raw);
        let landing = Url::parse(&format!("{}/", head))?;

        Ok(Self {
            base: landing.clone(),
            login: discovered.clone(),
            dashboard: landing.clone(),
            usage: landing.clone(),
            billing: landing,
        })
    }

    /// Joins an absolute portal path such as `/usage` onto the portal origin.
    pub fn page(&self, path: &str) -> Result<Url, PortalError> {
        Ok(self.login.join(path)?)
    }
}

/// Resolves a login form's `action` attribute against the login page.
/// A missing or blank action posts back to the login page itself.
pub fn resolve_form_action(login: &Url, action: Option<&str>) -> Url {
    match action.map(str::trim).filter(|a| !a.is_empty()) {
        Some(action) => login.join(action).unwrap_or_else(|_| login.clone()),
        None => login.clone(),
    }
}
