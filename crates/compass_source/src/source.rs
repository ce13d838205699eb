// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The per-deployment node source contract.

use std::fmt::Debug;

use crate::{Node, Result};

/// Provides the current node set of one deployment.
///
/// A node source is created by the discovery cache on first lookup and kept until it becomes
/// stale or idle. Implementations must be cheap to query: [`nodes`](Self::nodes) is called on
/// every lookup.
///
/// # Undeployment
///
/// [`was_undeployed`](Self::was_undeployed) must be monotonic: once it returns `true` for an
/// instance it must keep returning `true`. The cache never reuses such an instance; it replaces
/// it with a freshly created one on the next lookup.
///
/// # Releasable resources
///
/// Sources that own resources needing explicit release (an open watch, a subscription) expose
/// them through [`as_releasable`](Self::as_releasable). The cache calls
/// [`Releasable::release`] at most once per instance, when the source is evicted, replaced or
/// the cache shuts down.
pub trait NodeSource: Send + Sync + Debug {
    /// The source type tag of the variant that created this instance.
    fn source_type(&self) -> &str;

    /// Whether the backing deployment has disappeared.
    fn was_undeployed(&self) -> bool;

    /// The current nodes of the deployment.
    fn nodes(&self) -> Vec<Node>;

    /// The release capability of this source, if it owns releasable resources.
    fn as_releasable(&self) -> Option<&dyn Releasable> {
        None
    }
}

/// Capability of a node source that owns resources requiring explicit release.
pub trait Releasable: Send + Sync {
    /// Releases the resources held by the source.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`Release`](crate::ErrorKind::Release) if the resources could not
    /// be released cleanly.
    fn release(&self) -> Result<()>;
}
