// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use compass_source::{DeploymentId, DiscoveryConfig, Node, NodeSource};

use super::{CONFIG_SOURCE, LOCAL_SOURCE, LocalDeployments};

/// Where a [`ListedNodeSource`] reads its nodes from.
#[derive(Debug)]
enum Listing {
    Config(Arc<dyn DiscoveryConfig>),
    Local(LocalDeployments),
}

impl Listing {
    fn nodes(&self, deployment: &DeploymentId) -> Vec<Node> {
        match self {
            Self::Config(config) => config.configured_nodes(deployment),
            Self::Local(local) => local.nodes_of(deployment),
        }
    }
}

/// A node source over a node list kept in process, either in configuration or in
/// [`LocalDeployments`].
///
/// The list is read on every query, so edits show up without replacing the source. The first
/// time the list is found empty the source latches as undeployed; the cache then replaces it on
/// the next lookup.
#[derive(Debug)]
pub(crate) struct ListedNodeSource {
    source_type: &'static str,
    deployment: DeploymentId,
    listing: Listing,
    undeployed: AtomicBool,
}

impl ListedNodeSource {
    pub(crate) fn config(config: Arc<dyn DiscoveryConfig>, deployment: DeploymentId) -> Self {
        Self::new(CONFIG_SOURCE, deployment, Listing::Config(config))
    }

    pub(crate) fn local(local: LocalDeployments, deployment: DeploymentId) -> Self {
        Self::new(LOCAL_SOURCE, deployment, Listing::Local(local))
    }

    fn new(source_type: &'static str, deployment: DeploymentId, listing: Listing) -> Self {
        Self {
            source_type,
            deployment,
            listing,
            undeployed: AtomicBool::new(false),
        }
    }

    fn current(&self) -> Vec<Node> {
        if self.undeployed.load(Ordering::Acquire) {
            return Vec::new();
        }

        let nodes = self.listing.nodes(&self.deployment);
        if nodes.is_empty() {
            self.undeployed.store(true, Ordering::Release);
        }
        nodes
    }
}

impl NodeSource for ListedNodeSource {
    fn source_type(&self) -> &str {
        self.source_type
    }

    fn was_undeployed(&self) -> bool {
        self.current().is_empty()
    }

    fn nodes(&self) -> Vec<Node> {
        self.current()
    }
}
