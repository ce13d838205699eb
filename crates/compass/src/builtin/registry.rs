// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt::{self, Debug},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyspawn::{JoinHandle, Spawner};
use compass_source::{DeploymentId, DynRegistryClient, Error, Node, NodeSource, RegistryClient, Releasable, Result};
use futures::{
    channel::oneshot,
    future::{self, Either},
};
use parking_lot::{Mutex, RwLock};
use tick::Clock;

use super::REGISTRY_SOURCE;

/// How often the cache re-fetches the nodes of registry-backed deployments by default.
pub const REGISTRY_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// A node source backed by a discovery registry.
///
/// The source is only handed out after [`init`](Self::init) has completed the first fetch, so a
/// registry outage surfaces as a creation error instead of an empty node list. After that the
/// nodes follow the registry through [`refresh`](Self::refresh), called by hand or by the
/// background task started with [`start_refresh`](Self::start_refresh). Once the registry
/// reports the deployment gone the source stays undeployed; the cache then replaces it.
///
/// Releasing the source stops its background refresh.
///
/// # Examples
///
/// ```
/// use compass::RegistryNodeSource;
/// use compass_source::{DeploymentId, DynRegistryClient, Node, NodeSource, testing::MockRegistryClient};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> compass_source::Result<()> {
/// let registry = MockRegistryClient::new();
/// let id = DeploymentId::new("inventory", "us-east");
/// registry.deploy(id.clone(), vec![Node::new("10.1.0.7", 9000)]);
///
/// let source = RegistryNodeSource::init(DynRegistryClient::new_arc(registry.clone()), id.clone()).await?;
/// assert_eq!(source.nodes(), vec![Node::new("10.1.0.7", 9000)]);
///
/// registry.undeploy(&id);
/// source.refresh().await?;
/// assert!(source.was_undeployed());
/// # Ok(())
/// # }
/// ```
pub struct RegistryNodeSource {
    watch: Arc<Watch>,
    refresher: Mutex<Option<Refresher>>,
}

/// State shared between a source and its refresh task.
struct Watch {
    deployment: DeploymentId,
    client: Arc<DynRegistryClient<'static>>,
    nodes: RwLock<Vec<Node>>,
    undeployed: AtomicBool,
    released: AtomicBool,
}

impl Watch {
    async fn refresh(&self) -> Result<()> {
        if self.is_settled() {
            return Ok(());
        }

        match self.client.fetch(&self.deployment).await? {
            Some(nodes) => *self.nodes.write() = nodes,
            None => {
                self.undeployed.store(true, Ordering::Release);
                self.nodes.write().clear();
            }
        }
        Ok(())
    }

    /// Whether there is nothing left to fetch.
    fn is_settled(&self) -> bool {
        self.released.load(Ordering::Acquire) || self.undeployed.load(Ordering::Acquire)
    }
}

/// Handle to a running refresh task. Dropping it drops the stop sender, which ends the task.
#[derive(Debug)]
struct Refresher {
    stop: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

impl Debug for RegistryNodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryNodeSource")
            .field("deployment", &self.watch.deployment)
            .field("nodes", &*self.watch.nodes.read())
            .field("undeployed", &self.watch.undeployed.load(Ordering::Acquire))
            .field("released", &self.watch.released.load(Ordering::Acquire))
            .field("refreshing", &self.refresher.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryNodeSource {
    /// Creates the source and performs its initial fetch.
    ///
    /// # Errors
    ///
    /// Returns a [`Creation`](compass_source::ErrorKind::Creation) error if the initial fetch
    /// fails.
    pub async fn init(client: Arc<DynRegistryClient<'static>>, deployment: DeploymentId) -> Result<Self> {
        let fetched = client
            .fetch(&deployment)
            .await
            .map_err(|e| Error::creation(&deployment, e))?;

        let watch = Watch {
            undeployed: AtomicBool::new(fetched.is_none()),
            nodes: RwLock::new(fetched.unwrap_or_default()),
            released: AtomicBool::new(false),
            deployment,
            client,
        };

        Ok(Self {
            watch: Arc::new(watch),
            refresher: Mutex::new(None),
        })
    }

    /// Starts re-fetching the nodes every `interval` on `spawner`, timed by `clock`.
    ///
    /// The task ends once the source is released, dropped or found undeployed. Starting it again
    /// replaces the previous task. Does nothing if the source is already released or undeployed.
    pub fn start_refresh(&self, clock: &Clock, spawner: &Spawner, interval: Duration) {
        if self.watch.is_settled() {
            return;
        }

        let (stop, stopped) = oneshot::channel();
        let task = spawner.spawn(refresh_loop(Arc::clone(&self.watch), clock.clone(), interval, stopped));
        *self.refresher.lock() = Some(Refresher { stop, _task: task });
    }

    /// Re-fetches the nodes from the registry.
    ///
    /// Does nothing once the source is released or undeployed.
    ///
    /// # Errors
    ///
    /// Returns the registry client's error if the fetch fails; the previous nodes are kept.
    pub async fn refresh(&self) -> Result<()> {
        self.watch.refresh().await
    }

    /// Whether the source was released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.watch.released.load(Ordering::Acquire)
    }
}

async fn refresh_loop(watch: Arc<Watch>, clock: Clock, interval: Duration, mut stopped: oneshot::Receiver<()>) {
    while !watch.is_settled() {
        if let Either::Right(_) = future::select(clock.delay(interval), &mut stopped).await {
            break;
        }

        if let Err(error) = watch.refresh().await {
            tracing::event!(
                name: "compass.registry.refresh_failed",
                tracing::Level::WARN,
                deployment = %watch.deployment,
                error = %error,
            );
        }
    }
}

impl NodeSource for RegistryNodeSource {
    fn source_type(&self) -> &str {
        REGISTRY_SOURCE
    }

    fn was_undeployed(&self) -> bool {
        self.watch.undeployed.load(Ordering::Acquire)
    }

    fn nodes(&self) -> Vec<Node> {
        self.watch.nodes.read().clone()
    }

    fn as_releasable(&self) -> Option<&dyn Releasable> {
        Some(self)
    }
}

impl Releasable for RegistryNodeSource {
    fn release(&self) -> Result<()> {
        self.watch.released.store(true, Ordering::Release);
        if let Some(refresher) = self.refresher.lock().take() {
            // The task may already have ended on its own.
            let _ = refresher.stop.send(());
        }
        Ok(())
    }
}

/// Creates registry sources and keeps them refreshed.
#[derive(Clone)]
pub(crate) struct RegistryWatcher {
    client: Arc<DynRegistryClient<'static>>,
    clock: Clock,
    spawner: Spawner,
    interval: Duration,
}

impl Debug for RegistryWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryWatcher")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl RegistryWatcher {
    pub(crate) fn new(client: Arc<DynRegistryClient<'static>>, clock: Clock, spawner: Spawner, interval: Duration) -> Self {
        Self {
            client,
            clock,
            spawner,
            interval,
        }
    }

    pub(crate) async fn watch(&self, deployment: &DeploymentId) -> Result<RegistryNodeSource> {
        let source = RegistryNodeSource::init(Arc::clone(&self.client), deployment.clone()).await?;
        source.start_refresh(&self.clock, &self.spawner, self.interval);
        Ok(source)
    }
}
