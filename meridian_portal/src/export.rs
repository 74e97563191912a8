//! Downloading the half-hourly CSV export.

use crate::urls::FEED_IN_REPORT_PATH;
use crate::{PortalError, PortalSession};

impl PortalSession {
    /// Tries each configured export path and returns the body of the first
    /// 200 response that looks like CSV.
    pub async fn download_export(&mut self) -> Result<String, PortalError> {
        self.ensure_authenticated().await?;
        let urls = self.urls()?.clone();
        let referer = urls.page(FEED_IN_REPORT_PATH)?;
        let paths = self.options.export_paths.clone();

        for path in &paths {
            let url = urls.page(path)?;
            match self.fetch_page(&url, Some(&referer)).await {
                Ok(page)
                    if page.is_ok()
                        && looks_like_csv(
                            &page.content_type,
                            &page.body,
                            &self.options.markers.csv_header_tokens,
                        ) =>
                {
                    tracing::info!("csv export downloaded from {} ({} bytes)", url, page.body.len());
                    return Ok(page.body);
                }
                Ok(page) => tracing::debug!(
                    "{} answered {} ({}), not a csv export",
                    url,
                    page.status,
                    page.content_type
                ),
                Err(e @ PortalError::SessionExpired { .. }) => return Err(e),
                Err(e) => tracing::debug!("{} failed: {}", url, e),
            }
        }

        Err(PortalError::ExportUnavailable)
    }
}

/// Export bodies are accepted on any hint (content type, a comma, a known
/// header token, or a non-trivial length) as long as at least one line
/// is comma separated.
pub fn looks_like_csv(content_type: &str, body: &str, header_tokens: &[String]) -> bool {
    let content_type = content_type.to_lowercase();
    let hinted = content_type.contains("csv")
        || content_type.contains("text")
        || content_type.contains("application/octet-stream")
        || body.contains(',')
        || header_tokens.iter().any(|t| body.contains(t.as_str()))
        || body.len() > 100;

    hinted
        && body
            .lines()
            .any(|line| !line.trim().is_empty() && line.contains(','))
}
