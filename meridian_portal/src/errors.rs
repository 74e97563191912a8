//! Error types for the portal client.

use reqwest::StatusCode;

/// Errors that can occur while talking to the customer portal.
#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    /// Transport failure: timeout, connection error, unreadable body.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// A URL could not be parsed or joined.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// None of the candidate addresses looked like a login page.
    #[error("no login page found among {tried} candidate urls")]
    DiscoveryFailed { tried: usize },
    /// The discovered login page could not be fetched again.
    #[error("login page returned status {status}")]
    LoginPageStatus { status: StatusCode },
    /// The credential POST came back with a status outside 200/302/303.
    #[error("login rejected with status {status}")]
    LoginRejected { status: StatusCode },
    /// The portal explicitly said the credentials are wrong.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// The login response was ambiguous and the dashboard probe failed.
    #[error("login outcome could not be confirmed")]
    LoginUnconfirmed,
    /// An operation needed portal URLs before any login succeeded.
    #[error("not authenticated")]
    NotAuthenticated,
    /// Repeated 401/403 responses exhausted the re-authentication budget.
    #[error("session expired after {attempts} re-authentication attempts")]
    SessionExpired { attempts: u32 },
    /// No candidate export URL returned something that looks like CSV.
    #[error("no csv export available")]
    ExportUnavailable,
    /// The session was closed by its owner.
    #[error("session is closed")]
    SessionClosed,
}

impl PortalError {
    /// True when the failure points at the credentials rather than the
    /// network or the portal layout.
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::LoginRejected { .. } | Self::LoginUnconfirmed
        )
    }
}
