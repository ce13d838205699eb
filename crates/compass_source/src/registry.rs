// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{DeploymentId, Node, Result};

/// Query surface of a discovery registry.
///
/// The wire protocol spoken to the registry belongs to the implementation; the cache only needs
/// a way to ask for the current nodes of a deployment.
#[dynosaur::dynosaur(pub DynRegistryClient = dyn(box) RegistryClient, bridge(none))]
pub trait RegistryClient: Send + Sync {
    /// Fetches the current nodes of `deployment`.
    ///
    /// Resolves to `Ok(None)` when the registry does not know the deployment (it is not
    /// deployed), which is distinct from a deployment with zero healthy nodes.
    fn fetch(&self, deployment: &DeploymentId) -> impl Future<Output = Result<Option<Vec<Node>>>> + Send;
}
