//! Error types for the library layer.

use std::fmt;

use meridian_portal::PortalError;

use crate::config::ConfigError;
use crate::csv_export::CsvExportError;
use crate::patterns::PatternError;

/// Errors produced by the library layer, wrapping portal errors and adding
/// export parsing, pattern table and configuration failures.
#[derive(Debug)]
pub enum SolarError {
    /// An error from the portal session.
    Portal(PortalError),
    /// The CSV export could not be turned into a reading.
    Export(CsvExportError),
    /// The extraction pattern table failed to load.
    Patterns(PatternError),
    /// Configuration was missing or out of range.
    Config(ConfigError),
}

impl SolarError {
    /// True when the portal refused the username or password, as opposed
    /// to being unreachable or changing shape.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Self::Portal(e) if e.is_credential_problem())
    }
}

impl fmt::Display for SolarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portal(e) => write!(f, "Portal error: {}", e),
            Self::Export(e) => write!(f, "Export error: {}", e),
            Self::Patterns(e) => write!(f, "Pattern table error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for SolarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Portal(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Patterns(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<PortalError> for SolarError {
    fn from(e: PortalError) -> Self {
        Self::Portal(e)
    }
}

impl From<CsvExportError> for SolarError {
    fn from(e: CsvExportError) -> Self {
        Self::Export(e)
    }
}

impl From<PatternError> for SolarError {
    fn from(e: PatternError) -> Self {
        Self::Patterns(e)
    }
}

impl From<ConfigError> for SolarError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
