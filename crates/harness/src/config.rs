//! Test execution configuration and the capability interfaces of the
//! application under test
//!
//! The harness never talks to a concrete web application or browser driver
//! directly. Everything it needs from them is expressed as the narrow traits
//! in this module, which the embedding test project implements on top of its
//! own hosting and automation stack.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::UiTestContext;
use crate::error::Result;
use crate::resolutions::{self, Resolution};

/// One logical UI test: its technical name and the body driving the browser.
pub struct UiTestManifest {
    /// Technical name of the test, also used to derive the failure dump
    /// folder name.
    pub name: String,
    /// The test body. Invoked once per attempt, so it has to be repeatable.
    pub test: TestBody,
}

/// The test body callback. Raises on failure.
pub type TestBody = Box<dyn Fn(&mut UiTestContext) -> Result<()> + Send + Sync>;

/// A setup operation run at most once per snapshot path across concurrent
/// executions. Performs arbitrary setup against the freshly created context
/// and returns the relative URL the test should resume from.
pub type SetupOperation = Arc<dyn Fn(&mut UiTestContext) -> Result<String> + Send + Sync>;

/// Assertion over the application's collected log output.
pub type AppLogAssertion = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Assertion over the browser console log captured during the test.
pub type BrowserLogAssertion = Arc<dyn Fn(&[BrowserLogEntry]) -> Result<()> + Send + Sync>;

/// A web application instance under test, e.g. an app process started from a
/// published build directory.
#[async_trait]
pub trait WebApplicationInstance: Send {
    /// Starts the application and returns its root URL.
    async fn start_up(&mut self) -> Result<String>;

    /// Returns the log output the application produced so far.
    async fn get_log_output(&mut self) -> Result<String>;

    /// Persists a snapshot of the application's state (site files, database)
    /// under the given directory.
    async fn take_snapshot(&mut self, path: &Path) -> Result<()>;

    /// Stops the application and releases everything it holds.
    async fn dispose(&mut self) -> Result<()>;
}

/// Factory for not-yet-started application instances.
pub trait WebApplicationFactory: Send + Sync {
    /// Creates a new application instance. `startup_args` carries arguments
    /// injected by the harness before startup, e.g. the leased SMTP port of
    /// the mail capture service.
    fn create(&self, startup_args: &[String]) -> Box<dyn WebApplicationInstance>;
}

/// A browser automation scope wrapping the driver for one test attempt.
pub trait BrowserScope: Send {
    fn navigate_to(&mut self, url: &str) -> Result<()>;

    fn current_url(&mut self) -> Result<String>;

    fn page_source(&mut self) -> Result<String>;

    fn capture_screenshot(&mut self, path: &Path) -> Result<()>;

    /// Returns the browser console log collected so far and clears it.
    fn take_browser_log(&mut self) -> Result<Vec<BrowserLogEntry>>;

    fn dispose(&mut self);
}

/// Factory starting a browser scope bound to the application's root URL.
#[async_trait]
pub trait BrowserScopeFactory: Send + Sync {
    async fn start_scope(
        &self,
        base_url: &str,
        test_name: &str,
        browser: &BrowserConfiguration,
    ) -> Result<Box<dyn BrowserScope>>;
}

/// One entry of the browser's console log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserLogEntry {
    /// Where the entry originates from, e.g. `javascript` or `network`.
    pub source: String,
    pub level: String,
    pub message: String,
}

impl fmt::Display for BrowserLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.source, self.level, self.message)
    }
}

/// Configuration of a test execution.
pub struct UiTestExecutorConfiguration {
    /// Factory for the application instance the test runs against. Mandatory.
    pub application: Option<Arc<dyn WebApplicationFactory>>,

    /// Factory for the browser automation scope. Mandatory.
    pub browser_scope: Option<Arc<dyn BrowserScopeFactory>>,

    pub browser: BrowserConfiguration,

    /// Whether to start the mail capture service for the test and inject its
    /// SMTP port into the application's startup arguments.
    pub use_smtp_service: bool,

    /// Setup to run (or reuse the snapshot of) before the test body.
    pub setup_operation: Option<SetupOperation>,

    /// Cache key of the setup snapshot; executions sharing this path share
    /// one setup run.
    pub setup_snapshot_path: PathBuf,

    /// How many times a failed test is retried. The total number of attempts
    /// is one higher.
    pub max_retry_count: u32,

    pub failure_dumps: FailureDumpConfiguration,

    pub accessibility_checking: AccessibilityCheckingConfiguration,

    /// Assertion over the application log, run after the test body. Emits the
    /// log before propagating its failure.
    pub assert_app_logs: Option<AppLogAssertion>,

    /// Assertion over the browser console log, run after the application log
    /// assertion. Emits the formatted log before propagating its failure.
    pub assert_browser_log: Option<BrowserLogAssertion>,
}

impl Default for UiTestExecutorConfiguration {
    fn default() -> Self {
        Self {
            application: None,
            browser_scope: None,
            browser: BrowserConfiguration::default(),
            use_smtp_service: false,
            setup_operation: None,
            setup_snapshot_path: PathBuf::from("Temp/SetupSnapshot"),
            max_retry_count: 2,
            failure_dumps: FailureDumpConfiguration::default(),
            accessibility_checking: AccessibilityCheckingConfiguration::default(),
            assert_app_logs: None,
            assert_browser_log: None,
        }
    }
}

/// Browser-level settings passed through to the browser scope factory.
#[derive(Debug, Clone)]
pub struct BrowserConfiguration {
    pub headless: bool,
    pub window_size: Resolution,
}

impl Default for BrowserConfiguration {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: resolutions::HD,
        }
    }
}

/// Which artifacts to capture into the failure dump of a failed attempt.
#[derive(Debug, Clone)]
pub struct FailureDumpConfiguration {
    /// Root directory the per-test dump folders are created under. Cleared
    /// per test at the start of the execution.
    pub dumps_directory_path: PathBuf,

    /// Collapse the namespace prefix of parameterized test names so dump
    /// folder paths stay below filesystem length limits.
    pub use_short_names: bool,

    pub capture_app_snapshot: bool,
    pub capture_screenshot: bool,
    pub capture_html_source: bool,
    pub capture_browser_log: bool,
}

impl Default for FailureDumpConfiguration {
    fn default() -> Self {
        Self {
            dumps_directory_path: PathBuf::from("FailureDumps"),
            use_short_names: false,
            capture_app_snapshot: true,
            capture_screenshot: true,
            capture_html_source: true,
            capture_browser_log: true,
        }
    }
}

/// Accessibility report handling.
#[derive(Debug, Clone)]
pub struct AccessibilityCheckingConfiguration {
    /// Eagerly create the directory for reports that are written on every
    /// run, regardless of the test outcome.
    pub create_report_always: bool,

    pub always_created_reports_directory_path: PathBuf,

    /// Write the report carried by an accessibility assertion failure into
    /// the failure dump.
    pub create_report_on_failure: bool,
}

impl Default for AccessibilityCheckingConfiguration {
    fn default() -> Self {
        Self {
            create_report_always: false,
            always_created_reports_directory_path: PathBuf::from("AccessibilityReports"),
            create_report_on_failure: true,
        }
    }
}
