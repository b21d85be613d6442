//! Error types for the UI test harness

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the harness [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No ports available in the range {lower_bound}..{upper_bound}")]
    PortsExhausted { lower_bound: u16, upper_bound: u16 },

    #[error("Failed to start {program}: {reason}")]
    ProcessStartup { program: String, reason: String },

    #[error("{program} exited without printing the readiness marker {marker:?}")]
    StartupMarkerNotSeen { program: String, marker: String },

    #[error("One-time preparation failed: {0}")]
    PreparationFailed(String),

    #[error("Shared setup failed: {0}")]
    SetupFailed(String),

    #[error("Application instance error: {0}")]
    Application(String),

    #[error("Browser scope error: {0}")]
    Browser(String),

    #[error("Test failed: {0}")]
    TestFailed(String),

    #[error("Application log assertion failed: {0}")]
    AppLogAssertion(String),

    #[error("Browser log assertion failed: {0}")]
    BrowserLogAssertion(String),

    #[error("Accessibility assertion failed: {description}")]
    AccessibilityAssertion {
        description: String,
        /// Pre-rendered report of the violated accessibility rules. The
        /// harness persists this verbatim into the failure dump; rendering is
        /// up to whoever raised the failure.
        report_html: String,
    },

    #[error(
        "The test was attempted {} time(s) and won't be retried anymore. \
         You can see more details on why it's failing in the failure dumps folder: {}",
        .attempts,
        .dumps_path.display()
    )]
    TestFailedPermanently {
        attempts: u32,
        dumps_path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
