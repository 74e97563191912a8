//! Form login against the portal.

use regex::Regex;
use reqwest::header::{LOCATION, REFERER};
use reqwest::StatusCode;

use crate::session::{count_keywords, PortalMarkers};
use crate::urls::{resolve_form_action, PortalUrls};
use crate::{PortalError, PortalSession};

pub const USERNAME_FIELD: &str = "email";
pub const PASSWORD_FIELD: &str = "password";
pub const TOKEN_FIELD: &str = "authenticity_token";
pub const SUBMIT_FIELD: &str = "commit";
pub const SUBMIT_VALUE: &str = "Sign in";

/// How the portal answered the credential POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Redirected somewhere logged-in, or landed on a welcome page.
    Accepted,
    /// The page complained about the username or password.
    InvalidCredentials,
    /// A status other than 200/302/303.
    Rejected,
    /// None of the above; needs a dashboard probe to decide.
    Ambiguous,
}

/// Classifies the raw login response. The order of the checks matters:
/// status first, then the redirect target, then success and failure words.
pub fn classify_login_response(
    status: StatusCode,
    location: Option<&str>,
    body: &str,
    markers: &PortalMarkers,
) -> LoginOutcome {
    let is_redirect = matches!(status, StatusCode::FOUND | StatusCode::SEE_OTHER);
    if status != StatusCode::OK && !is_redirect {
        return LoginOutcome::Rejected;
    }

    if is_redirect {
        let location = location.unwrap_or("").to_lowercase();
        if location == "/"
            || markers
                .redirect_success
                .iter()
                .any(|m| location.contains(&m.to_lowercase()))
        {
            return LoginOutcome::Accepted;
        }
    }

    if status == StatusCode::OK && count_keywords(body, &markers.body_success) > 0 {
        return LoginOutcome::Accepted;
    }

    if count_keywords(body, &markers.body_failure) > 0 {
        return LoginOutcome::InvalidCredentials;
    }

    LoginOutcome::Ambiguous
}

/// First CSRF-style token matched by the ordered pattern list.
pub fn extract_csrf_token(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// The `action` attribute of the first form on the page.
pub fn extract_form_action(html: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

impl PortalSession {
    /// Runs discovery, fetches the login form and submits the credentials.
    ///
    /// Safe to call repeatedly: every call starts from discovery again.
    /// `Ok(())` means the session is logged in; the error says why not.
    pub async fn authenticate(&mut self) -> Result<(), PortalError> {
        self.ensure_open()?;
        self.state.logged_in = false;

        let discovered = self.discover_login_page().await?;
        let urls = PortalUrls::from_discovered(&discovered)?;
        self.state.urls = Some(urls.clone());

        let login_page = self.get(&urls.login, None).await?;
        if !login_page.is_ok() {
            tracing::warn!("login page {} answered {}", urls.login, login_page.status);
            return Err(PortalError::LoginPageStatus {
                status: login_page.status,
            });
        }

        let markers = &self.options.markers;
        let token = extract_csrf_token(&login_page.body, &markers.csrf_patterns);
        match &token {
            Some(t) => tracing::debug!("csrf token found ({} chars)", t.len()),
            None => tracing::debug!("no csrf token on login page, submitting without one"),
        }
        let action = extract_form_action(&login_page.body, &markers.form_action);
        let submit_url = resolve_form_action(&urls.login, action.as_deref());
        self.state.csrf_token = token.clone();
        self.state.form_action = Some(submit_url.clone());

        let credentials = self.credentials().clone();
        let mut fields = vec![
            (USERNAME_FIELD, credentials.username()),
            (PASSWORD_FIELD, credentials.password()),
            (SUBMIT_FIELD, SUBMIT_VALUE),
        ];
        if let Some(token) = token.as_deref() {
            fields.push((TOKEN_FIELD, token));
        }

        tracing::info!(
            "submitting login for {} to {}",
            credentials.masked_username(),
            submit_url
        );
        let resp = self
            .form
            .post(submit_url)
            .header(REFERER, urls.login.as_str())
            .form(&fields)
            .send()
            .await?;

        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;

        match classify_login_response(status, location.as_deref(), &body, &self.options.markers) {
            LoginOutcome::Accepted => {
                tracing::info!("login accepted ({})", status);
                self.state.logged_in = true;
                Ok(())
            }
            LoginOutcome::InvalidCredentials => {
                tracing::warn!("portal rejected the credentials");
                Err(PortalError::InvalidCredentials)
            }
            LoginOutcome::Rejected => {
                tracing::warn!("login POST answered {}", status);
                Err(PortalError::LoginRejected { status })
            }
            LoginOutcome::Ambiguous => {
                tracing::info!(
                    "login response ambiguous ({}, location {:?}), probing dashboard",
                    status,
                    location
                );
                self.state.logged_in = true;
                if self.confirm_logged_in().await {
                    Ok(())
                } else {
                    self.state.logged_in = false;
                    Err(PortalError::LoginUnconfirmed)
                }
            }
        }
    }

    /// Fetches the dashboard and looks for any logged-in indicator.
    /// Only used to settle ambiguous login responses.
    pub async fn confirm_logged_in(&self) -> bool {
        if !self.state.logged_in {
            return false;
        }
        let Some(urls) = self.state.urls.as_ref() else {
            return false;
        };

        match self.get(&urls.dashboard, Some(&urls.login)).await {
            Ok(page) if page.is_ok() => {
                let hits = page.keyword_hits(&self.options.markers.dashboard_keywords);
                tracing::debug!("dashboard probe: {} indicators", hits);
                hits > 0
            }
            Ok(page) => {
                tracing::debug!("dashboard probe answered {}", page.status);
                false
            }
            Err(e) => {
                tracing::debug!("dashboard probe failed: {}", e);
                false
            }
        }
    }
}
