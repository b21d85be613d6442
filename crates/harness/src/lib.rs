//! UI Test Harness
//!
//! This crate provides a browser-driven E2E testing harness that:
//! - Runs every test against its own ephemeral web application instance
//! - Coordinates ports, shared setup and helper processes between
//!   concurrently running tests
//! - Retries failed attempts up to a bound, capturing a failure dump per
//!   failed attempt
//! - Tears every acquired resource down no matter how an attempt ended
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     UiTestExecutor                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  per attempt                                                │
//! │    ├── SmtpService::start() ──────────▶ leased ports        │
//! │    ├── WebApplicationFactory::create() ─▶ app instance      │
//! │    ├── BrowserScopeFactory::start_scope() ─▶ browser scope  │
//! │    ├── SetupSnapshotCoordinator (shared, at-most-once)      │
//! │    ├── test body + log assertions                           │
//! │    ├── failure dump on error                                │
//! │    └── unconditional teardown                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  process-wide singletons                                    │
//! │    ├── PortLeaseManager (per port category)                 │
//! │    └── SetupSnapshotCoordinator (per executor)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The application under test and the browser driver stay behind the narrow
//! capability traits in [`config`]; the harness itself never touches a DOM or
//! an automation protocol.

pub mod config;
pub mod context;
pub mod dumps;
pub mod error;
pub mod executor;
pub mod ports;
pub mod resolutions;
pub mod smtp;
pub mod snapshot;

pub use config::{
    AccessibilityCheckingConfiguration, BrowserConfiguration, BrowserLogEntry, BrowserScope,
    BrowserScopeFactory, FailureDumpConfiguration, UiTestExecutorConfiguration, UiTestManifest,
    WebApplicationFactory, WebApplicationInstance,
};
pub use context::UiTestContext;
pub use error::{Error, Result};
pub use executor::UiTestExecutor;
pub use ports::PortLeaseManager;
pub use resolutions::Resolution;
pub use smtp::{SmtpServer, SmtpService, SmtpServiceConfiguration};
pub use snapshot::SetupSnapshotCoordinator;
