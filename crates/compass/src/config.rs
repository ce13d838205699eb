// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hot-reloadable discovery configuration.

use std::{collections::HashMap, sync::Arc, time::Duration};

use compass_source::{DeploymentId, DiscoveryConfig, Node};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::builtin::CONFIG_SOURCE;

const DEFAULT_MONITORING_LIFETIME_SECS: u64 = 600;

/// Discovery settings for the whole process.
///
/// # Examples
///
/// ```
/// use compass::DiscoveryOptions;
///
/// let options: DiscoveryOptions = serde_json::from_str(
///     r#"{
///         "default_source_type": "registry",
///         "monitoring_lifetime_secs": 120,
///         "services": {
///             "payments": {
///                 "source_type": "config",
///                 "zones": { "eu-west": [{ "host": "10.0.0.1", "port": 8443 }] }
///             }
///         }
///     }"#,
/// )?;
///
/// assert_eq!(options.source_type("payments"), "config");
/// assert_eq!(options.source_type("search"), "registry");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Source type used by services without an explicit one.
    pub default_source_type: String,
    /// Seconds a deployment may go without lookups before it is evicted.
    pub monitoring_lifetime_secs: u64,
    /// Per-service settings, keyed by service name.
    pub services: HashMap<String, ServiceOptions>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            default_source_type: CONFIG_SOURCE.to_owned(),
            monitoring_lifetime_secs: DEFAULT_MONITORING_LIFETIME_SECS,
            services: HashMap::new(),
        }
    }
}

impl DiscoveryOptions {
    /// The source type in effect for `service`.
    #[must_use]
    pub fn source_type(&self, service: &str) -> &str {
        self.services
            .get(service)
            .and_then(|s| s.source_type.as_deref())
            .unwrap_or(&self.default_source_type)
    }

    /// The idle lifetime of cache entries.
    #[must_use]
    pub fn monitoring_lifetime(&self) -> Duration {
        Duration::from_secs(self.monitoring_lifetime_secs)
    }

    /// The nodes configured for `deployment`, empty when none are listed.
    #[must_use]
    pub fn configured_nodes(&self, deployment: &DeploymentId) -> Vec<Node> {
        self.services
            .get(deployment.service())
            .and_then(|s| s.zones.get(deployment.zone()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Settings of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Overrides [`DiscoveryOptions::default_source_type`] for this service.
    pub source_type: Option<String>,
    /// Nodes listed per zone, used by the config-defined source type.
    pub zones: HashMap<String, Vec<Node>>,
}

/// A [`DiscoveryConfig`] whose options can be swapped at runtime.
///
/// Clones share the same options, so an operator-facing handle can update what the cache reads.
///
/// # Examples
///
/// ```
/// use compass::{DiscoveryOptions, SharedConfig};
/// use compass_source::DiscoveryConfig;
///
/// let config = SharedConfig::new(DiscoveryOptions::default());
/// let handle = config.clone();
///
/// handle.update(|options| {
///     options
///         .services
///         .entry("search".to_owned())
///         .or_default()
///         .source_type = Some("registry".to_owned());
/// });
///
/// assert_eq!(config.source_type("search"), "registry");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    options: Arc<RwLock<DiscoveryOptions>>,
}

impl SharedConfig {
    /// Creates a configuration holding `options`.
    #[must_use]
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options: Arc::new(RwLock::new(options)),
        }
    }

    /// Replaces the options wholesale.
    pub fn replace(&self, options: DiscoveryOptions) {
        *self.options.write() = options;
    }

    /// Edits the options in place.
    pub fn update(&self, edit: impl FnOnce(&mut DiscoveryOptions)) {
        edit(&mut self.options.write());
    }

    /// A copy of the current options.
    #[must_use]
    pub fn snapshot(&self) -> DiscoveryOptions {
        self.options.read().clone()
    }
}

impl DiscoveryConfig for SharedConfig {
    fn source_type(&self, service: &str) -> String {
        self.options.read().source_type(service).to_owned()
    }

    fn monitoring_lifetime(&self) -> Duration {
        self.options.read().monitoring_lifetime()
    }

    fn configured_nodes(&self, deployment: &DeploymentId) -> Vec<Node> {
        self.options.read().configured_nodes(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = DiscoveryOptions::default();

        assert_eq!(options.source_type("anything"), CONFIG_SOURCE);
        assert_eq!(options.monitoring_lifetime(), Duration::from_secs(600));
        assert!(options.configured_nodes(&DeploymentId::new("a", "b")).is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let options: DiscoveryOptions = serde_json::from_str(r#"{"monitoring_lifetime_secs": 5}"#).unwrap();

        assert_eq!(options.monitoring_lifetime(), Duration::from_secs(5));
        assert_eq!(options.default_source_type, CONFIG_SOURCE);
    }

    #[test]
    fn service_without_source_type_uses_default() {
        let options: DiscoveryOptions = serde_json::from_str(
            r#"{"default_source_type": "local", "services": {"api": {"zones": {"z1": [{"host": "h", "port": 1}]}}}}"#,
        )
        .unwrap();

        assert_eq!(options.source_type("api"), "local");
        assert_eq!(options.configured_nodes(&DeploymentId::new("api", "z1")), vec![Node::new("h", 1)]);
        assert!(options.configured_nodes(&DeploymentId::new("api", "z2")).is_empty());
    }

    #[test]
    fn shared_config_observes_updates() {
        let config = SharedConfig::default();
        let handle = config.clone();

        handle.update(|o| o.monitoring_lifetime_secs = 30);
        assert_eq!(config.monitoring_lifetime(), Duration::from_secs(30));

        handle.replace(DiscoveryOptions {
            default_source_type: "registry".to_owned(),
            ..DiscoveryOptions::default()
        });
        assert_eq!(config.source_type("svc"), "registry");
        assert_eq!(config.snapshot().monitoring_lifetime_secs, DEFAULT_MONITORING_LIFETIME_SECS);
    }
}
