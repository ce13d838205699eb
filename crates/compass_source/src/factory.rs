// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::{DeploymentId, NodeSource, Result};

/// A pluggable constructor for one node source type.
///
/// Factories are registered with the discovery cache and selected by the source type tag that
/// the configuration assigns to a service. A factory is consulted only for tags that are not
/// built into the cache.
///
/// Use [`DynNodeSourceFactory::new_arc`] to erase the concrete factory type.
#[dynosaur::dynosaur(pub DynNodeSourceFactory = dyn(box) NodeSourceFactory, bridge(none))]
pub trait NodeSourceFactory: Send + Sync {
    /// The source type tag this factory handles.
    fn source_type(&self) -> &str;

    /// Creates a node source for `deployment`.
    ///
    /// Asynchronous initialization, if any, must complete before the returned future resolves;
    /// the cache treats the returned instance as ready to serve lookups.
    fn try_create(&self, deployment: &DeploymentId) -> impl Future<Output = Result<Arc<dyn NodeSource>>> + Send;
}
