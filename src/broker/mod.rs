//! The broker: listens on a TCP port, accepts connections, owns the
//! dataset registry, and drives shutdown.
//!
//! # Architecture
//!
//! ```text
//! TcpListener.accept() ──► spawn(negotiation::handle_connection)
//!                                │
//!                     +----------+----------+
//!                     │                     │
//!               role::SOURCE           role::SINK
//!                     │                     │
//!              source_loop(dataset)   sink_loop(dataset, sink queue)
//! ```
//!
//! `Broker::stop` cancels a [`CancellationToken`] shared by every spawned
//! per-connection task and then awaits a [`JoinSet`] holding all of their
//! handles, so `serve` only returns once every attachment has finished its
//! close path.

pub mod dataset;
pub mod negotiation;
pub mod protocol;
pub mod queue;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use dataset::Dataset;

/// The process-lifetime mapping from dataset name to [`Dataset`].
///
/// A dataset is created lazily on first source attach and is never
/// removed, even once its source and all its sinks disconnect.
#[derive(Debug, Default)]
pub struct Registry {
    datasets: Mutex<HashMap<String, Arc<Dataset>>>,
}

impl Registry {
    fn new() -> Self {
        Self::default()
    }

    /// Return the named dataset, creating it if it doesn't exist yet.
    pub fn get_or_create(&self, name: &str) -> Arc<Dataset> {
        let mut datasets = self.datasets.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            datasets
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Dataset::new(name.to_owned()))),
        )
    }

    /// Return the named dataset if it already exists.
    pub fn get(&self, name: &str) -> Option<Arc<Dataset>> {
        self.datasets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Names of every registered dataset, in no particular order.
    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

/// Listens on a loopback TCP port and fans out named datasets to sinks.
pub struct Broker {
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Broker {
    /// Bind to `127.0.0.1:port`. The broker binds to loopback only, by
    /// design — remote access is out of scope (design note 2).
    pub async fn bind(port: u16) -> Result<(Self, TcpListener)> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(Error::BindFailure)?;
        let broker = Self {
            registry: Arc::new(Registry::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        };
        Ok((broker, listener))
    }

    /// A token that cancels when [`Broker::stop`] is called, for callers
    /// that want to race their own work against shutdown (e.g. the
    /// accept loop itself).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept connections until `stop` is invoked, spawning one task per
    /// connection that negotiates its role and then runs its steady-state
    /// loop. Returns once every spawned task has finished.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = listener.accept() => result,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            self.tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .spawn(async move {
                    negotiation::handle_connection(stream, peer, registry, cancel).await;
                });
        }

        self.join_all().await;
    }

    async fn join_all(&self) {
        let mut tasks = std::mem::replace(
            &mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()),
            JoinSet::new(),
        );
        while tasks.join_next().await.is_some() {}
    }

    /// Cancel every attachment task and the accept loop. `serve` returns
    /// once all tasks have completed or been cancelled.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_instance_on_repeat_calls() {
        let registry = Registry::new();
        let a = registry.get_or_create("alpha");
        let b = registry.get_or_create("alpha");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_returns_none_for_an_unregistered_name() {
        let registry = Registry::new();
        assert!(registry.get("alpha").is_none());
    }

    #[test]
    fn dataset_names_reflects_every_created_dataset() {
        let registry = Registry::new();
        registry.get_or_create("alpha");
        registry.get_or_create("beta");
        let mut names = registry.dataset_names();
        names.sort();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
