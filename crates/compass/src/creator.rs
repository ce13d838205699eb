// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use compass_source::{DeploymentId, DiscoveryConfig, Error, NodeSource, NodeSourceFactory, Result};

use crate::{
    FactoryRegistry,
    builtin::{CONFIG_SOURCE, ListedNodeSource, LOCAL_SOURCE, LocalDeployments, REGISTRY_SOURCE, RegistryWatcher},
};

/// Builds node sources for the source type currently configured for a deployment.
///
/// Holds no reference to the cache itself, so pending creations never keep the cache alive.
pub(crate) struct SourceCreator {
    config: Arc<dyn DiscoveryConfig>,
    factories: FactoryRegistry,
    registry: Option<RegistryWatcher>,
    local: LocalDeployments,
}

impl Debug for SourceCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCreator")
            .field("config", &self.config)
            .field("factories", &self.factories)
            .field("registry", &self.registry)
            .field("local", &self.local)
            .finish()
    }
}

impl SourceCreator {
    pub(crate) fn new(
        config: Arc<dyn DiscoveryConfig>,
        factories: FactoryRegistry,
        registry: Option<RegistryWatcher>,
        local: LocalDeployments,
    ) -> Self {
        Self {
            config,
            factories,
            registry,
            local,
        }
    }

    pub(crate) fn config(&self) -> &dyn DiscoveryConfig {
        &*self.config
    }

    pub(crate) fn local(&self) -> &LocalDeployments {
        &self.local
    }

    /// Whether `source` no longer reflects the deployment it was created for.
    pub(crate) fn is_deprecated(&self, deployment: &DeploymentId, source: &dyn NodeSource) -> bool {
        source.was_undeployed() || source.source_type() != self.config.source_type(deployment.service())
    }

    pub(crate) async fn create(&self, deployment: &DeploymentId) -> Result<Arc<dyn NodeSource>> {
        let source_type = self.config.source_type(deployment.service());

        match source_type.as_str() {
            CONFIG_SOURCE => Ok(Arc::new(ListedNodeSource::config(Arc::clone(&self.config), deployment.clone()))),
            LOCAL_SOURCE => Ok(Arc::new(ListedNodeSource::local(self.local.clone(), deployment.clone()))),
            REGISTRY_SOURCE => {
                let registry = self.registry.as_ref().ok_or_else(|| {
                    Error::configuration(deployment, "node source type 'registry' requires a registry client")
                })?;
                Ok(Arc::new(registry.watch(deployment).await?))
            }
            other => match self.factories.get(other) {
                Some(factory) => factory.try_create(deployment).await,
                None => Err(Error::configuration(
                    deployment,
                    format!("unsupported node source type '{other}'"),
                )),
            },
        }
    }
}
