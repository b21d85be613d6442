//! Failure dump capture and the filesystem helpers around it
//!
//! When a test attempt fails, whatever can still be read out of the running
//! context is persisted under the test's dump folder so the failure can be
//! analyzed after the fact. Every capture step is best-effort: a failing
//! capture is logged and must not hide the test's own failure or stop the
//! remaining captures.

use std::path::Path;

use tracing::warn;

use crate::config::{BrowserLogEntry, BrowserScope, UiTestExecutorConfiguration};
use crate::context::UiTestContext;
use crate::error::{Error, Result};

/// Replaces characters that are invalid in file and folder names.
pub fn make_file_system_friendly(name: &str) -> String {
    name.chars()
        .map(|character| match character {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            character if (character as u32) < 0x20 => '_',
            character => character,
        })
        .collect()
}

/// Shortens a parameterized test name like
/// `Tests.BasicTests.login_works(browser: Chrome)` to
/// `login_works(browser: Chrome)` by dropping the namespace prefix. Names
/// without a parameter list are returned unchanged.
pub fn collapse_parameterized_name(name: &str) -> &str {
    match name.find('(') {
        Some(parenthesis_index) => match name[..parenthesis_index].rfind('.') {
            Some(dot_index) => &name[dot_index + 1..],
            None => name,
        },
        None => name,
    }
}

/// Deletes a directory tree, treating an already missing directory as
/// success.
pub fn safely_delete_directory_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Formats browser log entries the way they're emitted and dumped.
pub(crate) fn format_browser_log(entries: &[BrowserLogEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The browser console log of one attempt, fetched at most once: retrieving
/// it clears the browser-side buffer, so every consumer within the attempt
/// has to share the first read.
pub(crate) struct BrowserLogCache {
    entries: Option<Vec<BrowserLogEntry>>,
}

impl BrowserLogCache {
    pub(crate) fn new() -> Self {
        Self { entries: None }
    }

    pub(crate) fn get(&mut self, scope: &mut dyn BrowserScope) -> Result<&[BrowserLogEntry]> {
        if self.entries.is_none() {
            self.entries = Some(scope.take_browser_log()?);
        }

        Ok(self.entries.as_deref().unwrap_or(&[]))
    }
}

/// Writes the failure dump of one failed attempt. Never fails; each capture
/// step only logs its own problems.
pub(crate) async fn capture_failure_dump(
    context: &mut UiTestContext,
    browser_log: &mut BrowserLogCache,
    configuration: &UiTestExecutorConfiguration,
    dump_root: &Path,
    attempt: u32,
    failure: &Error,
) {
    let attempt_path = dump_root.join(format!("Attempt {attempt}"));
    let debug_information_path = attempt_path.join("DebugInformation");

    if let Err(error) = std::fs::create_dir_all(&debug_information_path) {
        warn!(
            "Could not create the failure dump directory {}: {error}",
            attempt_path.display()
        );
        return;
    }

    let dumps = &configuration.failure_dumps;

    if dumps.capture_app_snapshot {
        if let Err(error) = context
            .application
            .take_snapshot(&attempt_path.join("AppDump"))
            .await
        {
            warn!("Capturing the application snapshot failed: {error}");
        }
    }

    if dumps.capture_screenshot {
        if let Err(error) = context
            .scope
            .capture_screenshot(&debug_information_path.join("Screenshot.png"))
        {
            warn!("Capturing the screenshot failed: {error}");
        }
    }

    if dumps.capture_html_source {
        match context.scope.page_source() {
            Ok(source) => {
                if let Err(error) =
                    std::fs::write(debug_information_path.join("PageSource.html"), source)
                {
                    warn!("Writing the page source failed: {error}");
                }
            }
            Err(error) => warn!("Capturing the page source failed: {error}"),
        }
    }

    if dumps.capture_browser_log {
        match browser_log.get(context.scope.as_mut()) {
            Ok(entries) => {
                if let Err(error) = std::fs::write(
                    debug_information_path.join("BrowserLog.log"),
                    format_browser_log(entries),
                ) {
                    warn!("Writing the browser log failed: {error}");
                }
            }
            Err(error) => warn!("Capturing the browser log failed: {error}"),
        }
    }

    if configuration.accessibility_checking.create_report_on_failure {
        if let Error::AccessibilityAssertion { report_html, .. } = failure {
            if let Err(error) = std::fs::write(
                debug_information_path.join("AccessibilityReport.html"),
                report_html,
            ) {
                warn!("Writing the accessibility report failed: {error}");
            }
        }
    }
}
