// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! An in-memory discovery cache that resolves deployments to their current nodes.
//!
//! A deployment is a service running in one zone, named by a
//! [`DeploymentId`](compass_source::DeploymentId). The [`DiscoveryCache`] owns one node source
//! per deployment and keeps it fresh without resolving on every call:
//!
//! - **Single-flight creation** - concurrent first lookups of a deployment share one creation,
//!   and share its outcome, failures included.
//! - **Transparent replacement** - a source whose deployment disappeared, or whose service was
//!   pointed at another source type in configuration, is replaced on the next lookup. Exactly one
//!   replacement is started however many callers notice.
//! - **Idle eviction** - a background janitor drops deployments nobody asked about for longer
//!   than the configured monitoring lifetime and releases the resources their sources hold.
//! - **Retry after failure** - failed creations are never cached; the next lookup tries again.
//!
//! # Source types
//!
//! The configuration assigns a source type to every service. Three are built in:
//! [`CONFIG_SOURCE`] lists nodes in configuration, [`LOCAL_SOURCE`] serves nodes declared in the
//! process, and [`REGISTRY_SOURCE`] queries a discovery registry. Any other type is looked up
//! among the [`NodeSourceFactory`](compass_source::NodeSourceFactory) implementations registered
//! on the builder.
//!
//! # Quick Start
//!
//! ```
//! use compass::{DiscoveryCache, DiscoveryOptions, SharedConfig};
//! use compass_source::{DeploymentId, Node, ReachabilityCheck, TrafficRouting};
//! use compass_source::testing::{MockFactory, MockLoadBalancerFactory};
//! use tick::Clock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> compass_source::Result<()> {
//! let config = SharedConfig::new(DiscoveryOptions {
//!     default_source_type: "consul".to_owned(),
//!     ..DiscoveryOptions::default()
//! });
//!
//! let cache = DiscoveryCache::builder(config.clone(), Clock::new_tokio())
//!     .factory(MockFactory::new("consul", vec![Node::new("10.0.0.1", 443)]))
//!     .load_balancer_factory(MockLoadBalancerFactory::new())
//!     .build();
//!
//! let id = DeploymentId::new("payments", "eu-west");
//! assert_eq!(cache.get_nodes(&id).await?, Some(vec![Node::new("10.0.0.1", 443)]));
//!
//! let balancer = cache
//!     .try_create_load_balancer(&id, ReachabilityCheck::Disabled, TrafficRouting::LocalZoneFirst)
//!     .await?;
//! assert!(balancer.is_some());
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The cache emits `tracing` events named `compass.*`. Lifecycle events (`compass.source.created`,
//! `compass.source.replaced`, `compass.source.evicted`) are logged at debug level. Failures to
//! release a source (`compass.source.release_failed`) or to refresh a registry-backed deployment
//! (`compass.registry.refresh_failed`) are logged at warn level.

mod builder;
mod builtin;
mod cache;
mod config;
mod creator;
mod factory;
mod janitor;

pub use builder::DiscoveryCacheBuilder;
pub use builtin::{CONFIG_SOURCE, LOCAL_SOURCE, LocalDeployments, REGISTRY_REFRESH_INTERVAL, REGISTRY_SOURCE, RegistryNodeSource};
pub use cache::DiscoveryCache;
pub use config::{DiscoveryOptions, ServiceOptions, SharedConfig};
pub use factory::FactoryRegistry;
pub use janitor::HOUSEKEEPING_INTERVAL;
