//! Setup snapshot coordination between concurrent test executions
//!
//! An expensive application setup (e.g. running a site's setup wizard and
//! snapshotting the result) only has to happen once per snapshot path, no
//! matter how many tests targeting that snapshot run concurrently. The first
//! caller for a path executes the operation; everybody else waits for its
//! published result and reuses it.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
enum SnapshotState {
    Pending,
    Ready(String),
    Failed(String),
}

/// Coordinates at-most-once execution of setup operations keyed by their
/// snapshot path. One instance per process, shared by every test execution.
#[derive(Default)]
pub struct SetupSnapshotCoordinator {
    entries: Mutex<HashMap<PathBuf, watch::Receiver<SnapshotState>>>,
}

impl SetupSnapshotCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` if this is the first call for `cache_key`, publishing
    /// its result locator; otherwise waits for the first caller's result and
    /// returns it without running anything.
    ///
    /// A failing operation publishes its failure: the executing caller gets
    /// the original error, every waiter a [`Error::SetupFailed`] carrying the
    /// same message. The key stays failed afterwards; nothing re-runs the
    /// operation for it.
    pub async fn run_operation_and_snapshot_if_new<F, Fut>(
        &self,
        cache_key: &Path,
        operation: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        // Check-or-insert under the lock, then run or wait without it.
        let executor_sender = {
            let mut entries = self.entries.lock();

            match entries.get(cache_key) {
                Some(receiver) => Err(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(SnapshotState::Pending);
                    entries.insert(cache_key.to_path_buf(), receiver);
                    Ok(sender)
                }
            }
        };

        match executor_sender {
            Ok(sender) => {
                debug!("Running the setup operation for {}", cache_key.display());

                match operation().await {
                    Ok(locator) => {
                        let _ = sender.send(SnapshotState::Ready(locator.clone()));
                        Ok(locator)
                    }
                    Err(error) => {
                        let _ = sender.send(SnapshotState::Failed(error.to_string()));
                        Err(error)
                    }
                }
            }
            Err(mut receiver) => {
                debug!(
                    "Waiting for the already running setup operation for {}",
                    cache_key.display()
                );

                let state = receiver
                    .wait_for(|state| !matches!(state, SnapshotState::Pending))
                    .await
                    .map(|state| (*state).clone())
                    .map_err(|_| {
                        Error::SetupFailed(
                            "the setup operation was abandoned before publishing a result".into(),
                        )
                    })?;

                match state {
                    SnapshotState::Ready(locator) => Ok(locator),
                    SnapshotState::Failed(message) => Err(Error::SetupFailed(message)),
                    SnapshotState::Pending => Err(Error::SetupFailed(
                        "the setup operation was abandoned before publishing a result".into(),
                    )),
                }
            }
        }
    }
}
