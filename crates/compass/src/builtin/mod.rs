// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Node sources built into the cache.
//!
//! Three source types are resolved without consulting the factory registry:
//!
//! - [`CONFIG_SOURCE`] - nodes listed in [`DiscoveryConfig`](compass_source::DiscoveryConfig).
//! - [`LOCAL_SOURCE`] - nodes declared in-process through [`LocalDeployments`].
//! - [`REGISTRY_SOURCE`] - nodes fetched from a [`RegistryClient`](compass_source::RegistryClient),
//!   which requires an initial fetch before the source is usable and is then refreshed in the
//!   background.

mod listed;
mod local;
mod registry;

pub(crate) use listed::ListedNodeSource;
pub use local::LocalDeployments;
pub use registry::{REGISTRY_REFRESH_INTERVAL, RegistryNodeSource};
pub(crate) use registry::RegistryWatcher;

/// Source type tag of configuration-defined node lists.
pub const CONFIG_SOURCE: &str = "config";

/// Source type tag of locally declared node lists.
pub const LOCAL_SOURCE: &str = "local";

/// Source type tag of registry-backed node lists.
pub const REGISTRY_SOURCE: &str = "registry";
