//! Background thread that periodically merges thread-local buffers.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::NamedRegistry;

/// Runs [`NamedRegistry::aggregate`] every `aggregation_interval`.
///
/// Stopping, explicitly or by dropping, runs one last merge before the
/// thread exits.
#[derive(Debug)]
pub struct Aggregator {
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Aggregator {
    /// Start the aggregator for `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(registry: Arc<NamedRegistry>) -> RegistryResult<Self> {
        let interval = registry.config().aggregation_interval;
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("rollstat-aggregator".to_owned())
            .spawn(move || {
                info!(interval_ms = interval.as_millis(), "Stats aggregator started");
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            registry.aggregate();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let buffers = registry.aggregate();
                info!(buffers = buffers, "Stats aggregator stopped");
            })
            .map_err(|e| RegistryError::aggregator_spawn(e.to_string()))?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Whether the background thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the aggregator and wait for its final merge.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the loop immediately.
        drop(self.shutdown_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Stats aggregator thread panicked");
            }
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
