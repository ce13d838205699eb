// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The load balancer built on top of a resolved deployment.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::DeploymentId;

/// How a load balancer verifies that nodes accept traffic.
///
/// The discovery cache forwards this value untouched to the [`LoadBalancerFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReachabilityCheck {
    /// Nodes are trusted as reported by discovery.
    #[default]
    Disabled,
    /// Nodes are probed periodically.
    Probe {
        /// Time between probes of one node.
        interval: Duration,
        /// How long a single probe may take before the node counts as unreachable.
        timeout: Duration,
    },
}

/// How a load balancer spreads requests across zones.
///
/// The discovery cache forwards this value untouched to the [`LoadBalancerFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficRouting {
    /// Any node of the deployment may receive traffic.
    #[default]
    AnyZone,
    /// Nodes in the caller's own zone are preferred.
    LocalZoneFirst,
}

/// A load balancer for one deployment.
pub trait LoadBalancer: Send + Sync + Debug {
    /// The deployment this load balancer routes to.
    fn deployment(&self) -> &DeploymentId;
}

/// Constructs load balancers.
///
/// The returned load balancer resolves nodes on its own schedule; the discovery cache only
/// decides whether construction should happen at all.
pub trait LoadBalancerFactory: Send + Sync + Debug {
    /// Creates a load balancer for `deployment`.
    fn create(&self, deployment: &DeploymentId, reachability: ReachabilityCheck, routing: TrafficRouting) -> Arc<dyn LoadBalancer>;
}
