//! The context of a running UI test

use crate::config::{BrowserScope, WebApplicationInstance};
use crate::error::{Error, Result};
use crate::smtp::SmtpServer;

/// Everything one test attempt has acquired: the application instance under
/// test, the browser scope driving it, and the optional mail capture service.
///
/// The context is handed to the setup operation and the test body; the
/// executor owns it for the rest of the attempt and tears it down
/// unconditionally afterwards.
pub struct UiTestContext {
    test_name: String,
    base_url: String,
    /// The web application instance currently running for this attempt.
    pub application: Box<dyn WebApplicationInstance>,
    /// The browser automation scope bound to the application.
    pub scope: Box<dyn BrowserScope>,
    pub(crate) smtp: Option<SmtpServer>,
}

impl UiTestContext {
    pub(crate) fn new(
        test_name: String,
        application: Box<dyn WebApplicationInstance>,
        scope: Box<dyn BrowserScope>,
        base_url: String,
        smtp: Option<SmtpServer>,
    ) -> Self {
        Self {
            test_name,
            base_url,
            application,
            scope,
            smtp,
        }
    }

    /// Technical name of the current test.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Root URL of the application instance.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The running mail capture service, if it was requested.
    pub fn smtp_server(&self) -> Option<&SmtpServer> {
        self.smtp.as_ref()
    }

    pub fn go_to_home_page(&mut self) -> Result<()> {
        self.go_to_relative_url("/")
    }

    /// Navigates to the given URL under the application's root.
    pub fn go_to_relative_url(&mut self, relative_url: &str) -> Result<()> {
        let url = self.absolute_url(relative_url);
        self.scope.navigate_to(&url)
    }

    /// Like [`go_to_relative_url`](Self::go_to_relative_url), but skips the
    /// navigation when the browser is already on the target URL.
    pub fn go_to_relative_url_if_elsewhere(&mut self, relative_url: &str) -> Result<()> {
        let url = self.absolute_url(relative_url);

        if self.scope.current_url()? == url {
            return Ok(());
        }

        self.scope.navigate_to(&url)
    }

    /// Resolves a relative URL against the application's root URL.
    pub fn absolute_url(&self, relative_url: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            relative_url.trim_start_matches('/')
        )
    }

    /// Navigates to the web UI of the mail capture service.
    pub fn go_to_smtp_web_ui(&mut self) -> Result<()> {
        let url = match &self.smtp {
            Some(server) => server.web_ui_url().to_string(),
            None => {
                return Err(Error::InvalidConfiguration(
                    "the test was started without the mail capture service".into(),
                ))
            }
        };

        self.scope.navigate_to(&url)
    }
}
