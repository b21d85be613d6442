//! Mail capture service management
//!
//! Starts an smtp4dev-style mail capture tool for tests that exercise email
//! sending: the application under test is pointed at a leased SMTP port and
//! the messages it sends can be inspected on the tool's web UI. The service
//! leases both ports from its own [`PortLeaseManager`]s so concurrently
//! running tests get disjoint instances.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ports::PortLeaseManager;

/// Configuration of the external mail capture tool.
#[derive(Debug, Clone)]
pub struct SmtpServiceConfiguration {
    /// The program hosting the tool.
    pub program: String,

    /// Leading arguments running the tool; the port arguments are appended.
    pub run_args: Vec<String>,

    /// Arguments for the one-time preparation run installing the tool, e.g. a
    /// package restore. Skipped when `None`.
    pub restore_args: Option<Vec<String>>,

    /// Tool manifest to check before starting, so a missing tool entry fails
    /// fast instead of as an inscrutable process error.
    pub tool_manifest_path: Option<PathBuf>,

    /// The key the tool needs to be registered under in the manifest's
    /// `tools` section.
    pub tool_manifest_key: String,

    /// Substring of the tool's output signaling it's ready to serve.
    pub ready_marker: String,

    /// Closed-open range the SMTP port is leased from.
    pub smtp_port_range: (u16, u16),

    /// Closed-open range the web UI port is leased from.
    pub web_ui_port_range: (u16, u16),
}

impl Default for SmtpServiceConfiguration {
    fn default() -> Self {
        Self {
            program: "dotnet".into(),
            run_args: vec!["tool".into(), "run".into(), "smtp4dev".into()],
            restore_args: Some(vec!["tool".into(), "restore".into()]),
            tool_manifest_path: Some(PathBuf::from(".config/dotnet-tools.json")),
            tool_manifest_key: "rnwood.smtp4dev".into(),
            ready_marker: "Application started. Press Ctrl+C to shut down.".into(),
            smtp_port_range: (7000, 7100),
            web_ui_port_range: (8000, 8100),
        }
    }
}

/// Long-lived service starting mail capture instances. An application wires
/// up one instance for its process lifetime and shares it between tests; the
/// port leases and the one-time preparation are coordinated through it.
pub struct SmtpService {
    configuration: SmtpServiceConfiguration,
    smtp_ports: Arc<PortLeaseManager>,
    web_ui_ports: Arc<PortLeaseManager>,
    restored: OnceCell<()>,
}

impl SmtpService {
    pub fn new(configuration: SmtpServiceConfiguration) -> Self {
        let smtp_ports = Arc::new(PortLeaseManager::new(
            configuration.smtp_port_range.0,
            configuration.smtp_port_range.1,
        ));
        let web_ui_ports = Arc::new(PortLeaseManager::new(
            configuration.web_ui_port_range.0,
            configuration.web_ui_port_range.1,
        ));

        Self {
            configuration,
            smtp_ports,
            web_ui_ports,
            restored: OnceCell::new(),
        }
    }

    /// Starts a mail capture instance on freshly leased ports and waits until
    /// it reports readiness on its standard output.
    ///
    /// Every failure past the lease step releases the leased ports before
    /// propagating, so a failed start never shrinks the ranges.
    pub async fn start(&self) -> Result<SmtpServer> {
        self.verify_tool_manifest()?;

        let smtp_port = self.smtp_ports.lease_available_random_port()?;
        let web_ui_port = match self.web_ui_ports.lease_available_random_port() {
            Ok(port) => port,
            Err(error) => {
                self.smtp_ports.stop_lease(smtp_port);
                return Err(error);
            }
        };

        match self.start_process(smtp_port, web_ui_port).await {
            Ok(server) => Ok(server),
            Err(error) => {
                self.smtp_ports.stop_lease(smtp_port);
                self.web_ui_ports.stop_lease(web_ui_port);
                Err(error)
            }
        }
    }

    fn verify_tool_manifest(&self) -> Result<()> {
        let Some(manifest_path) = &self.configuration.tool_manifest_path else {
            return Ok(());
        };

        if !manifest_path.exists() {
            return Err(Error::InvalidConfiguration(format!(
                "no tool manifest file found at {}",
                manifest_path.display()
            )));
        }

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest_path)?)?;

        let tool = manifest
            .get("tools")
            .and_then(|tools| tools.get(&self.configuration.tool_manifest_key));
        if tool.is_none() {
            return Err(Error::InvalidConfiguration(format!(
                "there is no {} configuration in the tool manifest file {}",
                self.configuration.tool_manifest_key,
                manifest_path.display()
            )));
        }

        Ok(())
    }

    /// Runs the preparation command the first time any instance starts;
    /// concurrent starters wait for the one running it.
    async fn restore_once(&self) -> Result<()> {
        let Some(restore_args) = &self.configuration.restore_args else {
            return Ok(());
        };

        self.restored
            .get_or_try_init(|| async {
                info!(
                    "Running one-time preparation: {} {}",
                    self.configuration.program,
                    restore_args.join(" ")
                );

                let output = Command::new(&self.configuration.program)
                    .args(restore_args)
                    .output()
                    .await?;

                if !output.status.success() {
                    return Err(Error::PreparationFailed(format!(
                        "{} {} failed with the following output: {}",
                        self.configuration.program,
                        restore_args.join(" "),
                        String::from_utf8_lossy(&output.stderr)
                    )));
                }

                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn start_process(&self, smtp_port: u16, web_ui_port: u16) -> Result<SmtpServer> {
        self.restore_once().await?;

        let web_ui_url = format!("http://localhost:{web_ui_port}");

        let mut command = Command::new(&self.configuration.program);
        command
            .args(&self.configuration.run_args)
            // The equal sign keeps the tool from creating a database file.
            .arg("--db=")
            .arg("--smtpport")
            .arg(smtp_port.to_string())
            .arg("--urls")
            .arg(&web_ui_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|error| Error::ProcessStartup {
            program: self.configuration.program.clone(),
            reason: error.to_string(),
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                return Err(Error::ProcessStartup {
                    program: self.configuration.program.clone(),
                    reason: "the standard output pipe could not be acquired".into(),
                })
            }
        };

        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("{}: {}", self.configuration.program, line);
                    if line.contains(&self.configuration.ready_marker) {
                        break;
                    }
                }
                Ok(None) => {
                    return Err(Error::StartupMarkerNotSeen {
                        program: self.configuration.program.clone(),
                        marker: self.configuration.ready_marker.clone(),
                    })
                }
                Err(error) => return Err(error.into()),
            }
        }

        info!("Mail capture service listening on port {smtp_port}, web UI at {web_ui_url}");

        Ok(SmtpServer {
            program: self.configuration.program.clone(),
            smtp_ports: Arc::clone(&self.smtp_ports),
            web_ui_ports: Arc::clone(&self.web_ui_ports),
            child: Some(child),
            smtp_port,
            web_ui_port,
            web_ui_url,
            disposed: false,
        })
    }
}

/// A running mail capture instance.
#[derive(Debug)]
pub struct SmtpServer {
    program: String,
    smtp_ports: Arc<PortLeaseManager>,
    web_ui_ports: Arc<PortLeaseManager>,
    child: Option<Child>,
    smtp_port: u16,
    web_ui_port: u16,
    web_ui_url: String,
    disposed: bool,
}

impl SmtpServer {
    /// The leased port the application should send mail to.
    pub fn smtp_port(&self) -> u16 {
        self.smtp_port
    }

    /// Web UI of the mail capture tool, for inspecting captured messages.
    pub fn web_ui_url(&self) -> &str {
        &self.web_ui_url
    }

    /// Releases the leased ports and stops the process if it's still running.
    /// Safe to call repeatedly.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.smtp_ports.stop_lease(self.smtp_port);
        self.web_ui_ports.stop_lease(self.web_ui_port);

        if let Some(mut child) = self.child.take() {
            stop_child(&mut child, &self.program).await;
        }
    }
}

impl Drop for SmtpServer {
    fn drop(&mut self) {
        // The process itself is covered by kill_on_drop; the leases have to
        // be returned by hand.
        if !self.disposed {
            self.smtp_ports.stop_lease(self.smtp_port);
            self.web_ui_ports.stop_lease(self.web_ui_port);
        }
    }
}

async fn stop_child(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        use std::time::Duration;

        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                // Give it a moment to shut down gracefully.
                let grace = tokio::time::timeout(Duration::from_millis(500), child.wait()).await;
                if grace.is_ok() {
                    return;
                }
            }
        }
    }

    if let Err(error) = child.kill().await {
        warn!("Failed to kill the {program} process: {error}");
    }
}
