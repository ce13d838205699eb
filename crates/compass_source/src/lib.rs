// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Collaborator contracts for the `compass` deployment discovery cache.
//!
//! The cache in `compass` owns the lifecycle of per-deployment node sources but never implements
//! one. This crate defines everything the cache talks to:
//!
//! - [`DeploymentId`] - the logical deployment key (service name + zone).
//! - [`Node`] - one reachable endpoint with metadata.
//! - [`NodeSource`] - the per-deployment provider of the current node set, with the optional
//!   [`Releasable`] capability for sources that own resources such as an open watch.
//! - [`NodeSourceFactory`] - a pluggable constructor for a named source type.
//! - [`RegistryClient`] - the query surface of a discovery registry.
//! - [`DiscoveryConfig`] - the hot-reloadable configuration accessor.
//! - [`LoadBalancerFactory`] and [`LoadBalancer`] - the load balancer built on top of a resolved
//!   node set.
//! - [`Error`] - the error shared by all of the above.
//!
//! # Implementing a node source
//!
//! ```
//! use std::sync::Arc;
//!
//! use compass_source::{DeploymentId, Node, NodeSource, NodeSourceFactory, Result};
//!
//! #[derive(Debug)]
//! struct Fixed(Vec<Node>);
//!
//! impl NodeSource for Fixed {
//!     fn source_type(&self) -> &str {
//!         "fixed"
//!     }
//!
//!     fn was_undeployed(&self) -> bool {
//!         false
//!     }
//!
//!     fn nodes(&self) -> Vec<Node> {
//!         self.0.clone()
//!     }
//! }
//!
//! struct FixedFactory;
//!
//! impl NodeSourceFactory for FixedFactory {
//!     fn source_type(&self) -> &str {
//!         "fixed"
//!     }
//!
//!     async fn try_create(&self, _deployment: &DeploymentId) -> Result<Arc<dyn NodeSource>> {
//!         Ok(Arc::new(Fixed(vec![Node::new("10.0.0.1", 8080)])))
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! The async traits are type-erased through [`DynNodeSourceFactory`] and [`DynRegistryClient`]
//! so that heterogeneous implementations can be registered side by side.

mod config;
mod deployment;
pub mod error;
mod factory;
mod load_balancer;
mod node;
mod registry;
mod source;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use config::DiscoveryConfig;
#[doc(inline)]
pub use deployment::DeploymentId;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use factory::{DynNodeSourceFactory, NodeSourceFactory};
#[doc(inline)]
pub use load_balancer::{LoadBalancer, LoadBalancerFactory, ReachabilityCheck, TrafficRouting};
#[doc(inline)]
pub use node::Node;
#[doc(inline)]
pub use registry::{DynRegistryClient, RegistryClient};
#[doc(inline)]
pub use source::{NodeSource, Releasable};
