// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::Arc,
};

use compass_source::{DynNodeSourceFactory, NodeSourceFactory};

/// Pluggable node source factories, keyed by the source type each one advertises.
///
/// # Examples
///
/// ```
/// use compass::FactoryRegistry;
/// use compass_source::testing::MockFactory;
///
/// let mut factories = FactoryRegistry::new();
/// factories.register(MockFactory::new("consul", Vec::new()));
///
/// assert!(factories.contains("consul"));
/// assert_eq!(factories.source_types(), vec!["consul"]);
/// ```
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<DynNodeSourceFactory<'static>>>,
}

impl Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("source_types", &self.source_types())
            .finish()
    }
}

impl FactoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under the source type it advertises.
    ///
    /// A factory registered earlier for the same source type is replaced.
    pub fn register(&mut self, factory: impl NodeSourceFactory + 'static) -> &mut Self {
        let source_type = factory.source_type().to_owned();
        if self
            .factories
            .insert(source_type.clone(), DynNodeSourceFactory::new_arc(factory))
            .is_some()
        {
            tracing::event!(
                name: "compass.factory.replaced",
                tracing::Level::WARN,
                source_type = %source_type,
            );
        }
        self
    }

    /// The factory registered for `source_type`.
    #[must_use]
    pub fn get(&self, source_type: &str) -> Option<&Arc<DynNodeSourceFactory<'static>>> {
        self.factories.get(source_type)
    }

    /// Whether a factory is registered for `source_type`.
    #[must_use]
    pub fn contains(&self, source_type: &str) -> bool {
        self.factories.contains_key(source_type)
    }

    /// The number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// The registered source types, sorted.
    #[must_use]
    pub fn source_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
