// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use compass_source::{DeploymentId, Node};
use dashmap::DashMap;

/// Deployments declared by the process itself rather than discovered.
///
/// Useful for development setups and for pinning a dependency to known endpoints. Clones share
/// the same declarations.
///
/// # Examples
///
/// ```
/// use compass::LocalDeployments;
/// use compass_source::{DeploymentId, Node};
///
/// let local = LocalDeployments::default();
/// let id = DeploymentId::new("ledger", "dev");
///
/// local.declare(id.clone(), vec![Node::new("127.0.0.1", 7000)]);
/// assert!(local.contains(&id));
///
/// local.withdraw(&id);
/// assert!(!local.contains(&id));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalDeployments {
    declared: Arc<DashMap<DeploymentId, Vec<Node>>>,
}

impl LocalDeployments {
    /// Declares (or re-declares) the nodes of `deployment`.
    ///
    /// Lookups see the new nodes right away. A deployment that was looked up while undeclared
    /// is picked up on its next lookup.
    pub fn declare(&self, deployment: DeploymentId, nodes: Vec<Node>) {
        self.declared.insert(deployment, nodes);
    }

    /// Removes the declaration of `deployment`, returning its nodes if it was declared.
    ///
    /// The deployment is reported as not deployed from then on, until declared again.
    pub fn withdraw(&self, deployment: &DeploymentId) -> Option<Vec<Node>> {
        self.declared.remove(deployment).map(|(_, nodes)| nodes)
    }

    /// Whether `deployment` is declared.
    #[must_use]
    pub fn contains(&self, deployment: &DeploymentId) -> bool {
        self.declared.contains_key(deployment)
    }

    pub(crate) fn nodes_of(&self, deployment: &DeploymentId) -> Vec<Node> {
        self.declared
            .get(deployment)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_deployment_has_no_nodes() {
        let local = LocalDeployments::default();

        assert!(local.nodes_of(&DeploymentId::new("svc", "zone")).is_empty());
    }

    #[test]
    fn clones_share_declarations() {
        let local = LocalDeployments::default();
        let handle = local.clone();
        let id = DeploymentId::new("svc", "zone");

        handle.declare(id.clone(), vec![Node::new("h", 1)]);
        assert_eq!(local.nodes_of(&id), vec![Node::new("h", 1)]);

        handle.declare(id.clone(), vec![Node::new("h", 2)]);
        assert_eq!(local.nodes_of(&id), vec![Node::new("h", 2)]);
    }

    #[test]
    fn withdraw_returns_previous_nodes() {
        let local = LocalDeployments::default();
        let id = DeploymentId::new("svc", "zone");
        local.declare(id.clone(), vec![Node::new("h", 1)]);

        assert_eq!(local.withdraw(&id), Some(vec![Node::new("h", 1)]));
        assert_eq!(local.withdraw(&id), None);
    }
}
