// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use anyspawn::Spawner;
use std::time::Duration;

use compass_source::{DeploymentId, DiscoveryConfig, DynRegistryClient, LoadBalancerFactory, Node, NodeSourceFactory, RegistryClient};
use tick::Clock;

use crate::{
    DiscoveryCache, FactoryRegistry, LocalDeployments, REGISTRY_REFRESH_INTERVAL,
    builtin::RegistryWatcher,
    cache::CacheState,
    creator::SourceCreator,
    janitor::Janitor,
};

/// Builder for [`DiscoveryCache`].
///
/// Created by [`DiscoveryCache::builder`].
///
/// # Examples
///
/// ```
/// use compass::{DiscoveryCache, SharedConfig};
/// use compass_source::testing::{MockFactory, MockLoadBalancerFactory, MockRegistryClient};
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = DiscoveryCache::builder(SharedConfig::default(), Clock::new_tokio())
///     .factory(MockFactory::new("consul", Vec::new()))
///     .registry_client(MockRegistryClient::new())
///     .load_balancer_factory(MockLoadBalancerFactory::new())
///     .build();
///
/// assert!(cache.is_empty());
/// cache.shutdown().await;
/// # }
/// ```
pub struct DiscoveryCacheBuilder {
    config: Arc<dyn DiscoveryConfig>,
    clock: Clock,
    factories: FactoryRegistry,
    registry_client: Option<Arc<DynRegistryClient<'static>>>,
    registry_refresh: Duration,
    local: LocalDeployments,
    load_balancers: Option<Arc<dyn LoadBalancerFactory>>,
    spawner: Option<Spawner>,
}

impl Debug for DiscoveryCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryCacheBuilder")
            .field("config", &self.config)
            .field("factories", &self.factories)
            .field("registry_client", &self.registry_client.is_some())
            .field("registry_refresh", &self.registry_refresh)
            .field("local", &self.local)
            .field("load_balancers", &self.load_balancers)
            .field("spawner", &self.spawner)
            .finish_non_exhaustive()
    }
}

impl DiscoveryCacheBuilder {
    pub(crate) fn new(config: Arc<dyn DiscoveryConfig>, clock: Clock) -> Self {
        Self {
            config,
            clock,
            factories: FactoryRegistry::new(),
            registry_client: None,
            registry_refresh: REGISTRY_REFRESH_INTERVAL,
            local: LocalDeployments::default(),
            load_balancers: None,
            spawner: None,
        }
    }

    /// Registers a factory for the source type it advertises.
    ///
    /// Factories are only consulted for source types that are not built in.
    #[must_use]
    pub fn factory(mut self, factory: impl NodeSourceFactory + 'static) -> Self {
        self.factories.register(factory);
        self
    }

    /// Sets the registry client used by the `registry` source type.
    #[must_use]
    pub fn registry_client(mut self, client: impl RegistryClient + 'static) -> Self {
        self.registry_client = Some(DynRegistryClient::new_arc(client));
        self
    }

    /// Sets how often registry-backed deployments are re-fetched. Defaults to
    /// [`REGISTRY_REFRESH_INTERVAL`].
    #[must_use]
    pub fn registry_refresh_interval(mut self, interval: Duration) -> Self {
        self.registry_refresh = interval;
        self
    }

    /// Declares the nodes of a deployment served by the `local` source type.
    #[must_use]
    pub fn local_deployment(self, deployment: DeploymentId, nodes: Vec<Node>) -> Self {
        self.local.declare(deployment, nodes);
        self
    }

    /// Sets the factory used by [`DiscoveryCache::try_create_load_balancer`].
    #[must_use]
    pub fn load_balancer_factory(mut self, factory: impl LoadBalancerFactory + 'static) -> Self {
        self.load_balancers = Some(Arc::new(factory));
        self
    }

    /// Sets the spawner that runs the janitor and registry refreshes. Defaults to Tokio.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Builds the cache and starts its janitor.
    ///
    /// # Panics
    ///
    /// With the default spawner, panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn build(self) -> DiscoveryCache {
        let spawner = self.spawner.unwrap_or_else(Spawner::new_tokio);
        let registry = self
            .registry_client
            .map(|client| RegistryWatcher::new(client, self.clock.clone(), spawner.clone(), self.registry_refresh));

        let creator = SourceCreator::new(self.config, self.factories, registry, self.local);
        let state = Arc::new(CacheState::new(creator, self.clock.clone(), self.load_balancers));

        let janitor = Janitor::start(Arc::clone(&state), self.clock, &spawner);

        DiscoveryCache::from_parts(state, janitor)
    }
}

#[cfg(test)]
mod tests {
    use compass_source::testing::{MockFactory, MockRegistryClient};

    use super::*;
    use crate::{DiscoveryOptions, REGISTRY_SOURCE, SharedConfig};

    #[test]
    fn debug_lists_configuration() {
        let builder = DiscoveryCache::builder(SharedConfig::default(), Clock::new_frozen())
            .factory(MockFactory::new("consul", Vec::new()))
            .registry_client(MockRegistryClient::new());

        let debug = format!("{builder:?}");

        assert!(debug.contains("consul"), "got: {debug}");
        assert!(debug.contains("registry_client: true"), "got: {debug}");
    }

    #[tokio::test]
    async fn registry_client_is_wired_to_registry_source() {
        let registry = MockRegistryClient::new();
        let id = DeploymentId::new("search", "ap-south");
        registry.deploy(id.clone(), vec![Node::new("10.2.0.1", 9200)]);
        let config = SharedConfig::new(DiscoveryOptions {
            default_source_type: REGISTRY_SOURCE.to_owned(),
            ..DiscoveryOptions::default()
        });

        let cache = DiscoveryCache::builder(config, Clock::new_frozen())
            .registry_client(registry.clone())
            .build();

        assert_eq!(cache.get_nodes(&id).await.unwrap(), Some(vec![Node::new("10.2.0.1", 9200)]));
        assert_eq!(registry.fetch_count(), 1);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn custom_spawner_runs_janitor() {
        let cache = DiscoveryCache::builder(SharedConfig::default(), Clock::new_frozen())
            .spawner(Spawner::new_tokio())
            .build();

        cache.shutdown().await;
    }
}
