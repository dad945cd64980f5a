//! Containers: deployment targets that gadgets render within.
//!
//! A container aggregates one or more feature sets into a single registry
//! and derives two views of it:
//!
//! - **Core features**: the configured always-on features plus their
//!   dependencies, injected into every gadget.
//! - **Container features**: every feature shipping scripts for the
//!   container page, with dependencies, for the environment-init response.
//!
//! It also carries the opaque settings blob (the `gadgets.features` section
//! of the container settings file) that is handed to clients unchanged.
//!
//! Containers are built once at startup and are read-only afterwards; the
//! only interior mutability is the resolver's memo table, which is a
//! concurrent map.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ContainerConfig, ServerConfig};
use crate::constants::SETTINGS_FEATURES_SECTION;
use crate::core::GadgetError;
use crate::features::{FeatureDefinition, FeatureSet, TargetType};
use crate::resolver::{FeatureGraph, ResolvedFeatures};

/// A named deployment target.
pub struct Container {
    name: String,
    graph: FeatureGraph,
    core_features: Vec<Arc<FeatureDefinition>>,
    container_features: Vec<Arc<FeatureDefinition>>,
    settings: Value,
}

impl Container {
    /// Assemble a container from loaded feature sets.
    ///
    /// # Errors
    ///
    /// Fails when a dependency or core feature name does not resolve, when
    /// the feature graph contains a cycle, or when `settings` is not a JSON
    /// object.
    pub fn new(
        name: impl Into<String>,
        feature_sets: Vec<FeatureSet>,
        core_names: &[String],
        settings: Value,
    ) -> Result<Self> {
        let name = name.into();
        if !settings.is_object() {
            return Err(GadgetError::ConfigError {
                message: format!("settings of container '{name}' must be a JSON object"),
            }
            .into());
        }

        let graph = FeatureGraph::build(
            name.clone(),
            feature_sets.iter().flat_map(|set| set.iter().cloned()),
        )?;
        graph.detect_cycles()?;

        let core_features = graph.resolve_all(core_names.iter().map(String::as_str))?;

        let container_roots: Vec<String> = graph
            .features()
            .filter(|feature| feature.targets(TargetType::Container))
            .map(|feature| feature.name.clone())
            .collect();
        let container_features = graph.resolve_all(container_roots.iter().map(String::as_str))?;

        info!(
            "Container '{}' ready: {} features, {} core, {} container",
            name,
            graph.node_count(),
            core_features.len(),
            container_features.len()
        );

        Ok(Self {
            name,
            graph,
            core_features,
            container_features,
            settings,
        })
    }

    /// Load feature sets and settings as described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when an index, manifest or settings file cannot be loaded, and
    /// for every error of [`Container::new`].
    pub fn from_config(config: &ContainerConfig) -> Result<Self> {
        let feature_sets = config
            .features
            .iter()
            .map(|index| FeatureSet::build(index, &config.resource_paths))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to load features of container '{}'", config.name))?;

        let settings = match &config.settings {
            Some(path) => load_settings(path)?,
            None => Value::Object(serde_json::Map::new()),
        };

        Self::new(config.name.clone(), feature_sets, &config.core_features, settings)
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every feature known to the container, in load order.
    pub fn features(&self) -> impl Iterator<Item = &Arc<FeatureDefinition>> {
        self.graph.features()
    }

    /// Look a feature up by exact name.
    pub fn feature(&self, name: &str) -> Option<&Arc<FeatureDefinition>> {
        self.graph.get(name)
    }

    /// Whether the container provides a feature.
    pub fn supports(&self, name: &str) -> bool {
        self.graph.contains(name)
    }

    /// Always-on features, dependency-first.
    pub fn core_features(&self) -> &[Arc<FeatureDefinition>] {
        &self.core_features
    }

    /// Features shipping container-page scripts, dependency-first.
    pub fn container_features(&self) -> &[Arc<FeatureDefinition>] {
        &self.container_features
    }

    /// Flatten a feature into its dependencies followed by itself.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::FeatureNotFound`] when the container lacks the
    /// feature and [`GadgetError::CircularDependency`] for cycles.
    pub fn resolve_dependencies(&self, name: &str) -> Result<ResolvedFeatures> {
        self.graph.resolve(name)
    }

    /// The dependency graph, for diagnostics.
    pub fn graph(&self) -> &FeatureGraph {
        &self.graph
    }

    /// Opaque settings object handed to clients.
    pub fn settings(&self) -> &Value {
        &self.settings
    }
}

/// Read a settings file and extract its `gadgets.features` section.
///
/// A file without that section yields an empty object.
///
/// # Errors
///
/// Fails when the file cannot be read or is not valid JSON.
pub fn load_settings(path: &std::path::Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read container settings: {}", path.display()))?;
    let mut document: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse container settings: {}", path.display()))?;

    match document.get_mut(SETTINGS_FEATURES_SECTION).map(Value::take) {
        Some(section) => Ok(section),
        None => {
            warn!(
                "Container settings {} have no \"{}\" section",
                path.display(),
                SETTINGS_FEATURES_SECTION
            );
            Ok(Value::Object(serde_json::Map::new()))
        }
    }
}

/// All configured containers, keyed by name.
#[derive(Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<String, Arc<Container>>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every container named by the configuration.
    ///
    /// # Errors
    ///
    /// Propagates the first container that fails to load.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut registry = Self::new();
        for container in &config.containers {
            registry.insert(Container::from_config(container)?);
        }
        Ok(registry)
    }

    /// Add a container, replacing any previous one with the same name.
    pub fn insert(&mut self, container: Container) {
        self.containers.insert(container.name.clone(), Arc::new(container));
    }

    /// Look a container up by name.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::ContainerNotFound`].
    pub fn get(&self, name: &str) -> Result<Arc<Container>> {
        self.containers.get(name).cloned().ok_or_else(|| {
            GadgetError::ContainerNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Container names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.containers.keys().map(String::as_str).collect()
    }
}
