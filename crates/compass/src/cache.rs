// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The discovery cache and its shared state.

use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::{Duration, Instant},
};

use compass_source::{
    DeploymentId, DiscoveryConfig, Error, LoadBalancer, LoadBalancerFactory, Node, NodeSource, ReachabilityCheck, Result,
    TrafficRouting,
};
use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::{Mutex, RwLock};
use tick::Clock;

use crate::{DiscoveryCacheBuilder, LocalDeployments, creator::SourceCreator, janitor::Janitor};

type Creation = Shared<BoxFuture<'static, Result<Arc<dyn NodeSource>>>>;

/// One cached deployment: the creation of its node source, pending or settled.
///
/// Every caller that finds the entry awaits the same creation. Entries are compared by pointer
/// identity, which is what replacement and failure cleanup key on.
///
/// Once the entry is taken out of the cache its source may be released. Reads go through
/// [`read`](Self::read), which excludes them from a release in progress and refuses them after.
pub(crate) struct CacheEntry {
    creation: Creation,
    retired: RwLock<bool>,
}

impl CacheEntry {
    /// Prepares a creation without polling it; the first caller to await it drives it.
    fn start(creator: &Arc<SourceCreator>, deployment: &DeploymentId) -> Arc<Self> {
        let creator = Arc::clone(creator);
        let deployment = deployment.clone();

        let creation = async move {
            let outcome = creator.create(&deployment).await;
            match &outcome {
                Ok(source) => tracing::event!(
                    name: "compass.source.created",
                    tracing::Level::DEBUG,
                    deployment = %deployment,
                    source_type = source.source_type(),
                    undeployed = source.was_undeployed(),
                ),
                Err(error) => tracing::event!(
                    name: "compass.source.failed",
                    tracing::Level::DEBUG,
                    deployment = %deployment,
                    error = %error,
                ),
            }
            outcome
        }
        .boxed()
        .shared();

        Arc::new(Self {
            creation,
            retired: RwLock::new(false),
        })
    }

    /// The node source, if creation has completed successfully.
    fn ready(&self) -> Option<&Arc<dyn NodeSource>> {
        match self.creation.peek() {
            Some(Ok(source)) => Some(source),
            _ => None,
        }
    }

    /// Runs `read` against `source` unless the entry was retired, in which case returns `None`.
    fn read<T>(&self, source: &dyn NodeSource, read: impl FnOnce(&dyn NodeSource) -> T) -> Option<T> {
        let retired = self.retired.read();
        (!*retired).then(|| read(source))
    }
}

pub(crate) struct CacheState {
    creator: Arc<SourceCreator>,
    entries: DashMap<DeploymentId, Arc<CacheEntry>>,
    last_requested: DashMap<DeploymentId, Instant>,
    clock: Clock,
    load_balancers: Option<Arc<dyn LoadBalancerFactory>>,
}

impl CacheState {
    pub(crate) fn new(creator: SourceCreator, clock: Clock, load_balancers: Option<Arc<dyn LoadBalancerFactory>>) -> Self {
        Self {
            creator: Arc::new(creator),
            entries: DashMap::new(),
            last_requested: DashMap::new(),
            clock,
            load_balancers,
        }
    }

    fn touch(&self, deployment: &DeploymentId) {
        self.last_requested.insert(deployment.clone(), self.clock.instant());
    }

    /// Finds the current entry of `deployment` and its node source, creating or replacing it as
    /// needed.
    async fn resolve(&self, deployment: &DeploymentId) -> Result<(Arc<CacheEntry>, Arc<dyn NodeSource>)> {
        loop {
            let existing = self.entries.get(deployment).map(|entry| Arc::clone(entry.value()));

            let Some(entry) = existing else {
                let entry = self.install(deployment);
                let source = self.settle(deployment, &entry).await?;
                return Ok((entry, source));
            };

            let source = self.settle(deployment, &entry).await?;
            match entry.read(&*source, |source| self.creator.is_deprecated(deployment, source)) {
                Some(false) => return Ok((entry, source)),
                Some(true) => {
                    let replacement = self.replace(deployment, &entry);
                    let source = self.settle(deployment, &replacement).await?;
                    return Ok((replacement, source));
                }
                // Evicted or replaced while we waited; whoever retired it also took it out.
                None => {}
            }
        }
    }

    /// Inserts a new entry unless one is already present, returning whichever is cached.
    fn install(&self, deployment: &DeploymentId) -> Arc<CacheEntry> {
        Arc::clone(
            self.entries
                .entry(deployment.clone())
                .or_insert_with(|| CacheEntry::start(&self.creator, deployment))
                .value(),
        )
    }

    /// Swaps `stale` for a new entry if it is still the cached one.
    ///
    /// The shard lock of `deployment` is held across the comparison and the swap, so exactly one
    /// of the callers that observed `stale` starts the replacement; the others pick it up.
    fn replace(&self, deployment: &DeploymentId, stale: &Arc<CacheEntry>) -> Arc<CacheEntry> {
        let (current, displaced) = match self.entries.entry(deployment.clone()) {
            Entry::Occupied(mut occupied) if Arc::ptr_eq(occupied.get(), stale) => {
                let fresh = CacheEntry::start(&self.creator, deployment);
                occupied.insert(Arc::clone(&fresh));
                (fresh, true)
            }
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let fresh = CacheEntry::start(&self.creator, deployment);
                vacant.insert(Arc::clone(&fresh));
                (fresh, false)
            }
        };

        if displaced {
            tracing::event!(
                name: "compass.source.replaced",
                tracing::Level::DEBUG,
                deployment = %deployment,
            );
            release(deployment, stale);
        }

        current
    }

    /// Awaits the creation of `entry`, dropping the entry if creation failed so the next lookup
    /// starts over.
    async fn settle(&self, deployment: &DeploymentId, entry: &Arc<CacheEntry>) -> Result<Arc<dyn NodeSource>> {
        let outcome = entry.creation.clone().await;
        if outcome.is_err() {
            self.entries.remove_if(deployment, |_, current| Arc::ptr_eq(current, entry));
        }
        outcome
    }

    pub(crate) fn evict_idle(&self) -> usize {
        let lifetime = self.creator.config().monitoring_lifetime();
        let now = self.clock.instant();

        let idle: Vec<DeploymentId> = self
            .last_requested
            .iter()
            .filter(|requested| is_idle(*requested.value(), lifetime, now))
            .map(|requested| requested.key().clone())
            .collect();

        let mut evicted = 0;
        for deployment in idle {
            // A lookup may have refreshed the stamp since the snapshot.
            if self
                .last_requested
                .remove_if(&deployment, |_, requested| is_idle(*requested, lifetime, now))
                .is_none()
            {
                continue;
            }

            let Some((_, entry)) = self.entries.remove(&deployment) else {
                continue;
            };

            evicted += 1;
            tracing::event!(
                name: "compass.source.evicted",
                tracing::Level::DEBUG,
                deployment = %deployment,
            );
            release(&deployment, &entry);
        }

        evicted
    }

    fn drain(&self) -> usize {
        let deployments: Vec<DeploymentId> = self.entries.iter().map(|entry| entry.key().clone()).collect();

        let mut drained = 0;
        for deployment in deployments {
            if let Some((_, entry)) = self.entries.remove(&deployment) {
                drained += 1;
                release(&deployment, &entry);
            }
        }
        self.last_requested.clear();

        drained
    }
}

fn is_idle(requested: Instant, lifetime: Duration, now: Instant) -> bool {
    requested.checked_add(lifetime).is_some_and(|deadline| deadline < now)
}

/// Retires an entry that was just taken out of the cache and releases its node source.
///
/// Entries whose creation is still pending or failed hold nothing to release. The retired flag is
/// set and the release runs under the write guard, so no read overlaps or follows it.
fn release(deployment: &DeploymentId, entry: &CacheEntry) {
    let Some(releasable) = entry.ready().and_then(|source| source.as_releasable()) else {
        return;
    };

    let mut retired = entry.retired.write();
    *retired = true;

    if let Err(error) = releasable.release() {
        tracing::event!(
            name: "compass.source.release_failed",
            tracing::Level::WARN,
            deployment = %deployment,
            error = %error,
        );
    }
}

/// Resolves deployments to their current nodes.
///
/// The cache creates one node source per deployment on first lookup and reuses it until it goes
/// stale: the deployment disappears, or the configuration points the service at another source
/// type. Concurrent lookups of a deployment share a single creation, and a stale source is
/// replaced exactly once no matter how many callers notice it.
///
/// A background janitor evicts deployments nobody asked about for longer than the configured
/// monitoring lifetime and releases whatever their sources hold. Call
/// [`shutdown`](Self::shutdown) to stop it and release everything still cached.
///
/// # Examples
///
/// ```
/// use compass::{DiscoveryCache, DiscoveryOptions, LOCAL_SOURCE, SharedConfig};
/// use compass_source::{DeploymentId, Node};
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> compass_source::Result<()> {
/// let config = SharedConfig::new(DiscoveryOptions {
///     default_source_type: LOCAL_SOURCE.to_owned(),
///     ..DiscoveryOptions::default()
/// });
///
/// let id = DeploymentId::new("checkout", "eu-west");
/// let cache = DiscoveryCache::builder(config, Clock::new_tokio())
///     .local_deployment(id.clone(), vec![Node::new("10.0.4.2", 8080)])
///     .build();
///
/// assert_eq!(cache.get_nodes(&id).await?, Some(vec![Node::new("10.0.4.2", 8080)]));
/// assert_eq!(cache.get_nodes(&DeploymentId::new("checkout", "us-east")).await?, None);
///
/// cache.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryCache {
    state: Arc<CacheState>,
    janitor: Mutex<Option<Janitor>>,
}

impl Debug for DiscoveryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("entries", &self.state.entries.len())
            .field("creator", &self.state.creator)
            .field("janitor_running", &self.janitor.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl DiscoveryCache {
    /// Starts building a cache that reads `config` and keeps time with `clock`.
    pub fn builder(config: impl DiscoveryConfig + 'static, clock: Clock) -> DiscoveryCacheBuilder {
        DiscoveryCacheBuilder::new(Arc::new(config), clock)
    }

    pub(crate) fn from_parts(state: Arc<CacheState>, janitor: Janitor) -> Self {
        Self {
            state,
            janitor: Mutex::new(Some(janitor)),
        }
    }

    /// Returns the current nodes of `deployment`, or `None` if it is not deployed.
    ///
    /// # Errors
    ///
    /// Returns the error of the node source creation this lookup waited on: a
    /// [`Configuration`](compass_source::ErrorKind::Configuration) error when the configured
    /// source type cannot be built, or a [`Creation`](compass_source::ErrorKind::Creation) error
    /// when the source failed to initialize. Failed creations are not cached; the next lookup
    /// tries again.
    pub async fn get_nodes(&self, deployment: &DeploymentId) -> Result<Option<Vec<Node>>> {
        self.state.touch(deployment);

        loop {
            let (entry, source) = self.state.resolve(deployment).await?;
            let nodes = entry.read(&*source, |source| (!source.was_undeployed()).then(|| source.nodes()));
            if let Some(nodes) = nodes {
                return Ok(nodes);
            }
        }
    }

    /// Creates a load balancer for `deployment` if it is currently deployed.
    ///
    /// Returns `None` without consulting the load balancer factory when the deployment is not
    /// deployed.
    ///
    /// # Errors
    ///
    /// Returns a [`Configuration`](compass_source::ErrorKind::Configuration) error if the cache
    /// was built without a load balancer factory, and otherwise fails like
    /// [`get_nodes`](Self::get_nodes).
    pub async fn try_create_load_balancer(
        &self,
        deployment: &DeploymentId,
        reachability: ReachabilityCheck,
        routing: TrafficRouting,
    ) -> Result<Option<Arc<dyn LoadBalancer>>> {
        let Some(factory) = self.state.load_balancers.as_ref() else {
            return Err(Error::configuration(deployment, "no load balancer factory is configured"));
        };

        Ok(self
            .get_nodes(deployment)
            .await?
            .map(|_| factory.create(deployment, reachability, routing)))
    }

    /// Runs one eviction pass now, returning how many deployments were evicted.
    ///
    /// This is what the janitor does every housekeeping interval.
    pub fn evict_idle(&self) -> usize {
        self.state.evict_idle()
    }

    /// Stops the janitor and releases every cached node source.
    ///
    /// Lookups keep working afterwards, but nothing evicts their entries any more. Calling this
    /// more than once is harmless.
    pub async fn shutdown(&self) {
        let janitor = self.janitor.lock().take();
        let Some(janitor) = janitor else {
            return;
        };

        janitor.stop().await;
        let released = self.state.drain();
        tracing::event!(
            name: "compass.shutdown",
            tracing::Level::INFO,
            entries = released,
        );
    }

    /// The number of cached deployments, pending creations included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    /// Whether no deployment is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }

    /// The locally declared deployments served by the `local` source type.
    #[must_use]
    pub fn local_deployments(&self) -> &LocalDeployments {
        self.state.creator.local()
    }
}
