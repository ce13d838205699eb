// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::time::Duration;

use crate::{DeploymentId, Node};

/// Synchronous accessor for discovery configuration.
///
/// Values may change between calls (hot reload); callers re-read them on every use instead of
/// caching them.
pub trait DiscoveryConfig: Send + Sync + Debug {
    /// The source type tag configured for `service`.
    fn source_type(&self, service: &str) -> String;

    /// How long a deployment may go without lookups before its cache entry is evicted.
    fn monitoring_lifetime(&self) -> Duration;

    /// The nodes listed in configuration for `deployment`, for the config-defined source type.
    fn configured_nodes(&self, deployment: &DeploymentId) -> Vec<Node>;
}
