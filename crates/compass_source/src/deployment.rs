// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one logical deployment: a service running in a zone.
///
/// Two identifiers are equal exactly when both the service name and the zone are equal, and
/// hashing is consistent with that, so the type can key concurrent maps directly.
///
/// # Examples
///
/// ```
/// use compass_source::DeploymentId;
///
/// let id = DeploymentId::new("checkout", "eu-west");
/// assert_eq!(id.service(), "checkout");
/// assert_eq!(id.zone(), "eu-west");
/// assert_eq!(id.to_string(), "checkout/eu-west");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeploymentId {
    service: String,
    zone: String,
}

impl DeploymentId {
    /// Creates an identifier for `service` deployed in `zone`.
    #[must_use]
    pub fn new(service: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            zone: zone.into(),
        }
    }

    /// The service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The environment or zone the service is deployed in.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.zone)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn equality_covers_service_and_zone() {
        let a = DeploymentId::new("svc", "zone-a");

        assert_eq!(a, DeploymentId::new("svc", "zone-a"));
        assert_ne!(a, DeploymentId::new("svc", "zone-b"));
        assert_ne!(a, DeploymentId::new("other", "zone-a"));
    }

    #[test]
    fn hashing_matches_equality() {
        let mut set = HashSet::new();
        set.insert(DeploymentId::new("svc", "zone"));
        set.insert(DeploymentId::new(String::from("svc"), String::from("zone")));
        set.insert(DeploymentId::new("svc", "other"));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn deserializes_from_json() {
        let id: DeploymentId = serde_json::from_str(r#"{"service":"billing","zone":"us-east"}"#).unwrap();
        assert_eq!(id, DeploymentId::new("billing", "us-east"));
    }
}
