//! Long-lived portal session: one cookie jar, two HTTP clients and the
//! login bookkeeping that the authenticator and extractors share.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use crate::urls::{PortalUrls, DEFAULT_CANDIDATE_URLS, DEFAULT_EXPORT_PATHS};
use crate::user_agent::get_user_agent;
use crate::PortalError;

/// Re-authentication attempts allowed per cycle on 401/403 responses.
pub const MAX_AUTH_RETRIES: u32 = 3;

/// Per-request timeout unless the owner configures another one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Username/password pair. The password never leaves this type except
/// as a form field on the login POST.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Username safe for logs and diagnostics.
    pub fn masked_username(&self) -> String {
        mask_username(&self.username)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.masked_username())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Keeps the first one or two characters of the local part and the
/// domain: `john@example.com` becomes `jo***@example.com`.
pub fn mask_username(username: &str) -> String {
    let (local, domain) = match username.split_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (username, None),
    };
    let keep = if local.chars().count() > 2 { 2 } else { 1 };
    let prefix: String = local.chars().take(keep).collect();
    match domain {
        Some(domain) => format!("{}***@{}", prefix, domain),
        None => format!("{}***", prefix),
    }
}

/// Text markers the portal layer keys on. The owner builds these from its
/// pattern table; this crate carries no copy of its own.
#[derive(Debug, Clone)]
pub struct PortalMarkers {
    /// Tried in order; the first capture wins.
    pub csrf_patterns: Vec<Regex>,
    pub form_action: Regex,
    pub login_keywords: Vec<String>,
    pub min_login_keywords: usize,
    pub dashboard_keywords: Vec<String>,
    /// `Location` substrings that mean the login went through.
    pub redirect_success: Vec<String>,
    pub body_success: Vec<String>,
    pub body_failure: Vec<String>,
    pub csv_header_tokens: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub candidate_urls: Vec<String>,
    pub export_paths: Vec<String>,
    pub markers: PortalMarkers,
}

impl SessionOptions {
    pub fn new(markers: PortalMarkers) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            candidate_urls: owned(DEFAULT_CANDIDATE_URLS),
            export_paths: owned(DEFAULT_EXPORT_PATHS),
            markers,
        }
    }

    pub fn with_candidate_urls(mut self, urls: Vec<String>) -> Self {
        self.candidate_urls = urls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Mutable login bookkeeping. Only the session itself writes to it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub logged_in: bool,
    #[serde(skip)]
    pub csrf_token: Option<String>,
    pub form_action: Option<Url>,
    pub urls: Option<PortalUrls>,
    pub retry_count: u32,
}

/// A fetched page with its body already read.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl Page {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Number of distinct keywords present in the body, ignoring case.
    pub fn keyword_hits(&self, keywords: &[String]) -> usize {
        count_keywords(&self.body, keywords)
    }
}

/// Counts how many of `keywords` appear in `body`, case-insensitively.
/// Each keyword counts at most once.
pub fn count_keywords(body: &str, keywords: &[String]) -> usize {
    let lower = body.to_lowercase();
    keywords
        .iter()
        .filter(|k| lower.contains(&k.to_lowercase()))
        .count()
}

/// Owns the HTTP clients and cookies for one portal account.
///
/// The browsing client follows redirects; the form client never does, so
/// the authenticator can inspect the login POST's `Location` header. Both
/// share a cookie jar, which is what carries the login between them.
pub struct PortalSession {
    credentials: Credentials,
    pub(crate) options: SessionOptions,
    browser: reqwest::Client,
    pub(crate) form: reqwest::Client,
    pub(crate) state: SessionState,
    closed: bool,
}

impl PortalSession {
    pub fn new(credentials: Credentials, options: SessionOptions) -> Result<Self, PortalError> {
        let (browser, form) = build_clients(options.timeout)?;
        Ok(Self {
            credentials,
            options,
            browser,
            form,
            state: SessionState::default(),
            closed: false,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Portal addresses, available once a login page has been discovered.
    pub fn urls(&self) -> Result<&PortalUrls, PortalError> {
        self.state.urls.as_ref().ok_or(PortalError::NotAuthenticated)
    }

    /// Starts a new update cycle: the re-authentication budget is per cycle.
    pub fn begin_cycle(&mut self) {
        self.state.retry_count = 0;
    }

    fn auth_budget_spent(&self) -> bool {
        self.state.retry_count >= MAX_AUTH_RETRIES
    }

    /// Throws away cookies and login state and rebuilds both clients.
    /// A closed session is reopened. The re-authentication count survives;
    /// only [`begin_cycle`](Self::begin_cycle) restores the budget.
    pub fn reset(&mut self) -> Result<(), PortalError> {
        let (browser, form) = build_clients(self.options.timeout)?;
        self.browser = browser;
        self.form = form;
        self.state = SessionState {
            retry_count: self.state.retry_count,
            ..SessionState::default()
        };
        self.closed = false;
        tracing::info!("portal session reset for {}", self.credentials.masked_username());
        Ok(())
    }

    /// Marks the session closed. Later requests fail with
    /// [`PortalError::SessionClosed`] until [`reset`](Self::reset).
    pub fn close(&mut self) {
        self.state = SessionState::default();
        self.closed = true;
    }

    pub(crate) fn ensure_open(&self) -> Result<(), PortalError> {
        if self.closed {
            return Err(PortalError::SessionClosed);
        }
        Ok(())
    }

    /// Logs in unless the session already is. Once this cycle's
    /// re-authentication budget is spent no further login is attempted.
    pub async fn ensure_authenticated(&mut self) -> Result<(), PortalError> {
        if self.state.logged_in {
            return Ok(());
        }
        if self.auth_budget_spent() {
            return Err(PortalError::SessionExpired {
                attempts: self.state.retry_count,
            });
        }
        self.authenticate().await
    }

    /// Plain GET through the browsing client. No re-authentication.
    pub(crate) async fn get(&self, url: &Url, referer: Option<&Url>) -> Result<Page, PortalError> {
        self.ensure_open()?;
        let mut request = self.browser.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer.as_str());
        }
        let resp = request.send().await?;

        let status = resp.status();
        let final_url = resp.url().clone();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let body = resp.text().await?;

        Ok(Page {
            url: final_url,
            status,
            content_type,
            body,
        })
    }

    /// Authenticated GET. A 401/403 answer triggers a fresh login and a
    /// retry, at most [`MAX_AUTH_RETRIES`] times per cycle; past that the
    /// session is reset and the fetch fails.
    pub async fn fetch_page(&mut self, url: &Url, referer: Option<&Url>) -> Result<Page, PortalError> {
        loop {
            let page = self.get(url, referer).await?;
            if !matches!(page.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Ok(page);
            }

            if self.auth_budget_spent() {
                let attempts = self.state.retry_count;
                tracing::warn!(
                    "{} still answers {} after {} re-logins, resetting session",
                    url,
                    page.status,
                    attempts
                );
                self.reset()?;
                return Err(PortalError::SessionExpired { attempts });
            }

            self.state.retry_count += 1;
            tracing::warn!(
                "{} answered {}, re-authenticating (attempt {}/{})",
                url,
                page.status,
                self.state.retry_count,
                MAX_AUTH_RETRIES
            );
            self.state.logged_in = false;
            self.authenticate().await?;
        }
    }
}

fn build_clients(timeout: Duration) -> Result<(reqwest::Client, reqwest::Client), PortalError> {
    let jar = Arc::new(Jar::default());
    let user_agent = get_user_agent();

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-NZ,en;q=0.9"));
    headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("pragma", HeaderValue::from_static("no-cache"));

    let browser = reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers.clone())
        .cookie_provider(jar.clone())
        .timeout(timeout)
        .build()?;
    let form = reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .cookie_provider(jar)
        .redirect(Policy::none())
        .timeout(timeout)
        .build()?;
    Ok((browser, form))
}

/// Minimal markers for unit tests; production markers come from the
/// owner's pattern table.
#[cfg(test)]
pub(crate) fn test_markers() -> PortalMarkers {
    let compile = |p: &str| {
        regex::RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .unwrap()
    };
    PortalMarkers {
        csrf_patterns: vec![
            compile(r#"name="_token"\s+value="([^"]+)""#),
            compile(r#"name="csrf_token"\s+value="([^"]+)""#),
            compile(r#"name="authenticity_token"\s+value="([^"]+)""#),
        ],
        form_action: compile(r#"<form[^>]*action=["']([^"']+)["']"#),
        login_keywords: owned(&["password", "username", "login", "sign in", "email"]),
        min_login_keywords: 2,
        dashboard_keywords: owned(&["dashboard", "current balance", "recent activity"]),
        redirect_success: owned(&["dashboard", "customers", "home"]),
        body_success: owned(&["dashboard", "welcome"]),
        body_failure: owned(&["invalid", "incorrect"]),
        csv_header_tokens: owned(&["Date,Time", "Feed-in", "Consumption"]),
    }
}
