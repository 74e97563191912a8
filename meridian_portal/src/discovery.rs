//! Locating the live login page among the known candidate addresses.

use url::Url;

use crate::session::count_keywords;
use crate::{PortalError, PortalSession};

impl PortalSession {
    /// Probes each candidate address (following redirects) and returns the
    /// final URL of the first one that answers 200 with enough login
    /// keywords. Candidate failures are logged and skipped.
    pub async fn discover_login_page(&self) -> Result<Url, PortalError> {
        self.ensure_open()?;
        let markers = &self.options.markers;

        for candidate in &self.options.candidate_urls {
            let url = match Url::parse(candidate) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("skipping malformed candidate url {}: {}", candidate, e);
                    continue;
                }
            };

            match self.get(&url, None).await {
                Ok(page) if page.is_ok() => {
                    let score = score_login_page(&page.body, &markers.login_keywords);
                    tracing::debug!("{} -> {} ({} login keywords)", candidate, page.url, score);
                    if score >= markers.min_login_keywords {
                        tracing::info!("login page found at {}", page.url);
                        return Ok(page.url);
                    }
                }
                Ok(page) => tracing::debug!("{} answered {}", candidate, page.status),
                Err(e) => tracing::debug!("{} failed: {}", candidate, e),
            }
        }

        tracing::warn!(
            "no login page among {} candidate urls",
            self.options.candidate_urls.len()
        );
        Err(PortalError::DiscoveryFailed {
            tried: self.options.candidate_urls.len(),
        })
    }
}

/// Number of distinct login keywords present in a page body.
pub fn score_login_page(body: &str, keywords: &[String]) -> usize {
    count_keywords(body, keywords)
}
