//! HTTP client for the Meridian Energy customer portal.
//!
//! The portal has no API: this crate finds the login page, signs in
//! through the HTML form, keeps the cookie session alive and fetches
//! pages and the CSV export for the extraction layer.

mod auth;
mod discovery;
mod errors;
mod export;
mod session;
pub mod urls;
pub mod user_agent;

pub use self::auth::{
    classify_login_response, extract_csrf_token, extract_form_action, LoginOutcome,
};
pub use self::discovery::score_login_page;
pub use self::errors::PortalError;
pub use self::export::looks_like_csv;
pub use self::session::{
    count_keywords, mask_username, Credentials, Page, PortalMarkers, PortalSession,
    SessionOptions, SessionState, DEFAULT_TIMEOUT, MAX_AUTH_RETRIES,
};
pub use self::urls::PortalUrls;
pub use reqwest::StatusCode;
