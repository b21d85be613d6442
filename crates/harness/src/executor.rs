//! The UI test executor
//!
//! Drives one named test to completion: acquires the per-attempt resources
//! (mail capture service, application instance, browser scope), runs the
//! shared setup or reuses its snapshot, executes the test body and the
//! post-run log assertions, captures a failure dump when an attempt fails,
//! retries up to the configured bound, and tears every acquired resource down
//! no matter how the attempt ended.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::{
    BrowserScopeFactory, UiTestExecutorConfiguration, UiTestManifest, WebApplicationFactory,
    WebApplicationInstance,
};
use crate::context::UiTestContext;
use crate::dumps::{self, BrowserLogCache};
use crate::error::{Error, Result};
use crate::smtp::{SmtpServer, SmtpService};
use crate::snapshot::SetupSnapshotCoordinator;

/// Executes UI tests on new web application instances within newly created
/// browser scopes.
///
/// One executor is wired up per process and shared between every concurrently
/// running test: it owns the process-wide coordination state (the setup
/// snapshot coordinator and, optionally, the mail capture service with its
/// port leases).
#[derive(Default)]
pub struct UiTestExecutor {
    snapshots: Arc<SetupSnapshotCoordinator>,
    smtp: Option<Arc<SmtpService>>,
}

impl UiTestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires up the mail capture service tests can request with
    /// [`UiTestExecutorConfiguration::use_smtp_service`].
    pub fn with_smtp_service(mut self, smtp: Arc<SmtpService>) -> Self {
        self.smtp = Some(smtp);
        self
    }

    /// Executes a test on a new web application instance within a newly
    /// created browser scope, retrying failed attempts up to the configured
    /// bound.
    ///
    /// Only the final attempt's failure is returned; it's wrapped in
    /// [`Error::TestFailedPermanently`], which points at the failure dumps
    /// folder of the test. Intermediate failures are logged.
    pub async fn execute_test(
        &self,
        manifest: &UiTestManifest,
        configuration: &UiTestExecutorConfiguration,
    ) -> Result<()> {
        if manifest.name.is_empty() {
            return Err(Error::InvalidConfiguration(
                "the test needs a name".into(),
            ));
        }

        let application_factory = match &configuration.application {
            Some(factory) => Arc::clone(factory),
            None => {
                return Err(Error::InvalidConfiguration(
                    "an application factory needs to be provided".into(),
                ))
            }
        };
        let browser_scope_factory = match &configuration.browser_scope {
            Some(factory) => Arc::clone(factory),
            None => {
                return Err(Error::InvalidConfiguration(
                    "a browser scope factory needs to be provided".into(),
                ))
            }
        };
        if configuration.use_smtp_service && self.smtp.is_none() {
            return Err(Error::InvalidConfiguration(
                "the configuration requests the mail capture service but the executor was \
                 built without one"
                    .into(),
            ));
        }

        let start_time = Instant::now();
        info!("Starting the execution of {}.", manifest.name);

        let mut dump_folder_name_base = manifest.name.as_str();
        if configuration.failure_dumps.use_short_names {
            dump_folder_name_base = dumps::collapse_parameterized_name(dump_folder_name_base);
        }
        let dump_root = configuration
            .failure_dumps
            .dumps_directory_path
            .join(dumps::make_file_system_friendly(dump_folder_name_base));
        dumps::safely_delete_directory_if_exists(&dump_root)?;

        if configuration.accessibility_checking.create_report_always {
            std::fs::create_dir_all(
                &configuration
                    .accessibility_checking
                    .always_created_reports_directory_path,
            )?;
        }

        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .run_attempt(
                    manifest,
                    configuration,
                    &application_factory,
                    &browser_scope_factory,
                    &dump_root,
                    attempt,
                )
                .await;

            info!(
                "Finishing the execution of {}, total time: {:?}.",
                manifest.name,
                start_time.elapsed()
            );

            let failure = match outcome {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };

            if attempt == configuration.max_retry_count {
                let dumps_path =
                    std::path::absolute(&dump_root).unwrap_or_else(|_| dump_root.clone());
                error!(
                    "The test was attempted {} time(s) and won't be retried anymore. You can \
                     see more details on why it's failing in the failure dumps folder: {}",
                    attempt + 1,
                    dumps_path.display()
                );
                return Err(Error::TestFailedPermanently {
                    attempts: attempt + 1,
                    dumps_path,
                    source: Box::new(failure),
                });
            }

            warn!(
                "The test was attempted {} time(s). {} more attempt(s) will be made.",
                attempt + 1,
                configuration.max_retry_count - attempt
            );
            attempt += 1;
        }
    }

    /// One attempt: run the phases, capture the dump on failure, then tear
    /// everything down.
    async fn run_attempt(
        &self,
        manifest: &UiTestManifest,
        configuration: &UiTestExecutorConfiguration,
        application_factory: &Arc<dyn WebApplicationFactory>,
        browser_scope_factory: &Arc<dyn BrowserScopeFactory>,
        dump_root: &Path,
        attempt: u32,
    ) -> Result<()> {
        let mut context: Option<UiTestContext> = None;
        let mut browser_log = BrowserLogCache::new();

        let outcome = self
            .run_attempt_phases(
                manifest,
                configuration,
                application_factory,
                browser_scope_factory,
                &mut context,
                &mut browser_log,
            )
            .await;

        if let Err(failure) = &outcome {
            error!("The test failed: {failure}");

            if let Some(context) = context.as_mut() {
                dumps::capture_failure_dump(
                    context,
                    &mut browser_log,
                    configuration,
                    dump_root,
                    attempt,
                    failure,
                )
                .await;
            }
        }

        if let Some(mut context) = context.take() {
            context.scope.dispose();

            if let Err(dispose_error) = context.application.dispose().await {
                warn!("Disposing the application instance failed: {dispose_error}");
            }

            if let Some(mut smtp) = context.smtp.take() {
                smtp.dispose().await;
            }
        }

        outcome
    }

    async fn run_attempt_phases(
        &self,
        manifest: &UiTestManifest,
        configuration: &UiTestExecutorConfiguration,
        application_factory: &Arc<dyn WebApplicationFactory>,
        browser_scope_factory: &Arc<dyn BrowserScopeFactory>,
        context_slot: &mut Option<UiTestContext>,
        browser_log: &mut BrowserLogCache,
    ) -> Result<()> {
        if let Some(setup_operation) = &configuration.setup_operation {
            let setup_operation = Arc::clone(setup_operation);
            let slot = &mut *context_slot;
            let locator = self
                .snapshots
                .run_operation_and_snapshot_if_new(
                    &configuration.setup_snapshot_path,
                    || async move {
                        // The context has to be created inside the operation
                        // too: the application needs the snapshot
                        // configuration to be in effect at startup.
                        let created = self
                            .create_context(
                                manifest,
                                configuration,
                                application_factory,
                                browser_scope_factory,
                            )
                            .await?;
                        let context = slot.insert(created);

                        setup_operation(context)
                    },
                )
                .await?;

            if context_slot.is_none() {
                *context_slot = Some(
                    self.create_context(
                        manifest,
                        configuration,
                        application_factory,
                        browser_scope_factory,
                    )
                    .await?,
                );
            }

            if let Some(context) = context_slot.as_mut() {
                context.go_to_relative_url_if_elsewhere(&locator)?;
            }
        }

        if context_slot.is_none() {
            *context_slot = Some(
                self.create_context(
                    manifest,
                    configuration,
                    application_factory,
                    browser_scope_factory,
                )
                .await?,
            );
        }

        let context = match context_slot.as_mut() {
            Some(context) => context,
            None => {
                return Err(Error::InvalidConfiguration(
                    "the test context could not be created".into(),
                ))
            }
        };

        (manifest.test)(context)?;

        self.assert_logs(configuration, context, browser_log).await
    }

    async fn assert_logs(
        &self,
        configuration: &UiTestExecutorConfiguration,
        context: &mut UiTestContext,
        browser_log: &mut BrowserLogCache,
    ) -> Result<()> {
        if let Some(assert_app_logs) = &configuration.assert_app_logs {
            let log_output = context.application.get_log_output().await?;

            if let Err(failure) = assert_app_logs(&log_output) {
                info!("Application logs:\n{log_output}");
                return Err(failure);
            }
        }

        if let Some(assert_browser_log) = &configuration.assert_browser_log {
            let entries = browser_log.get(context.scope.as_mut())?.to_vec();

            if let Err(failure) = assert_browser_log(&entries) {
                info!("Browser logs:\n{}", dumps::format_browser_log(&entries));
                return Err(failure);
            }
        }

        Ok(())
    }

    /// Acquires everything one attempt needs, in dependency order: the mail
    /// capture service first so its port can be injected into the
    /// application's startup arguments, then the application instance, then
    /// the browser scope bound to the application's root URL.
    async fn create_context(
        &self,
        manifest: &UiTestManifest,
        configuration: &UiTestExecutorConfiguration,
        application_factory: &Arc<dyn WebApplicationFactory>,
        browser_scope_factory: &Arc<dyn BrowserScopeFactory>,
    ) -> Result<UiTestContext> {
        let mut smtp_server = None;
        let mut startup_args = Vec::new();

        if configuration.use_smtp_service {
            if let Some(smtp) = &self.smtp {
                let server = smtp.start().await?;
                startup_args.push("--SmtpPort".to_string());
                startup_args.push(server.smtp_port().to_string());
                smtp_server = Some(server);
            }
        }

        let mut application = application_factory.create(&startup_args);
        let base_url = match application.start_up().await {
            Ok(url) => url,
            Err(error) => {
                dispose_partial(application, smtp_server).await;
                return Err(error);
            }
        };

        let scope = match browser_scope_factory
            .start_scope(&base_url, &manifest.name, &configuration.browser)
            .await
        {
            Ok(scope) => scope,
            Err(error) => {
                dispose_partial(application, smtp_server).await;
                return Err(error);
            }
        };

        Ok(UiTestContext::new(
            manifest.name.clone(),
            application,
            scope,
            base_url,
            smtp_server,
        ))
    }
}

/// Cleans up after an acquisition that failed partway, so the attempt-level
/// teardown only ever sees fully built contexts and nothing leaks.
async fn dispose_partial(
    mut application: Box<dyn WebApplicationInstance>,
    smtp_server: Option<SmtpServer>,
) {
    if let Err(error) = application.dispose().await {
        warn!("Disposing the application instance after a failed acquisition failed: {error}");
    }

    if let Some(mut server) = smtp_server {
        server.dispose().await;
    }
}
