//! Solar and energy readings for a Meridian Energy account.
//!
//! Wraps the portal session with a data-driven extraction layer: the CSV
//! export when it is available, HTML scraping when it is not, and sensible
//! defaults when the portal is unreachable. The [`Coordinator`] runs this
//! on an interval and always has a reading to publish.

pub mod config;
pub mod coordinator;
pub mod csv_export;
pub mod diagnostics;
pub mod error;
pub mod patterns;
pub mod pipeline;
pub mod rates;
pub mod reading;
pub mod solar;
pub mod usage;

pub use config::{Config, ConfigError};
pub use coordinator::Coordinator;
pub use diagnostics::{DiagnosticsSnapshot, SelfTestReport};
pub use error::SolarError;
pub use meridian_portal::{Credentials, PortalError, PortalSession};
pub use patterns::{ExtractionPatterns, PatternError};
pub use pipeline::ExtractionPipeline;
pub use reading::{CycleOutcome, EnergyReading, ReadingField, Tier};
