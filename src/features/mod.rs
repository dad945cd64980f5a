//! Feature set loading.
//!
//! A feature set is described by an index file: one relative path per line,
//! blank lines and `#` comments ignored, order preserved. Each path names a
//! feature manifest:
//!
//! ```xml
//! <feature>
//!   <name>rpc</name>
//!   <dependency>core</dependency>
//!   <gadget>
//!     <script src="rpc.js"/>
//!   </gadget>
//!   <container>
//!     <script src="res://rpc/container.js"/>
//!   </container>
//!   <all>
//!     <script>gadgets.rpc.init();</script>
//!   </all>
//! </feature>
//! ```
//!
//! An index entry ending in `.txt` is itself an index and is loaded
//! recursively, so a feature set can be split across directories.
//!
//! Scripts without `src` are inline; `src` values are classified by
//! [`ScriptDefinition::from_src`]. A `res://` script that resolves under no
//! resource root is kept with an empty source and logged: consumers skip it
//! and the rest of the feature still renders.

mod definition;

pub use definition::{FeatureDefinition, ScriptDefinition, TargetType};

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::GadgetError;

/// Ordered collection of features loaded from one index file.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: Vec<Arc<FeatureDefinition>>,
}

impl FeatureSet {
    /// Load every feature listed by `index`.
    ///
    /// # Errors
    ///
    /// Fails when the index or any manifest cannot be read, when a manifest
    /// is not well-formed XML, or when a manifest lacks a `<name>`.
    pub fn build(index: &Path, resource_paths: &[PathBuf]) -> Result<Self> {
        let mut features = Vec::new();
        let mut visited = HashSet::new();
        load_index(index, resource_paths, &mut features, &mut visited)?;
        info!("Loaded {} features from {}", features.len(), index.display());
        Ok(Self {
            features,
        })
    }

    /// Build a set from already constructed definitions.
    pub fn from_features(features: impl IntoIterator<Item = FeatureDefinition>) -> Self {
        Self {
            features: features.into_iter().map(Arc::new).collect(),
        }
    }

    /// Look a feature up by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<FeatureDefinition>> {
        self.features.iter().find(|feature| feature.name == name)
    }

    /// Features in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FeatureDefinition>> {
        self.features.iter()
    }

    /// Feature names in load order.
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|feature| feature.name.as_str()).collect()
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the set holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Read an index file into its entries.
pub fn read_index(index: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index)
        .with_context(|| format!("Failed to read feature index: {}", index.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

fn load_index(
    index: &Path,
    resource_paths: &[PathBuf],
    features: &mut Vec<Arc<FeatureDefinition>>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
    if !visited.insert(index.to_path_buf()) {
        debug!("Skipping already loaded feature index {}", index.display());
        return Ok(());
    }

    let base = index.parent().map(Path::to_path_buf).unwrap_or_default();
    for entry in read_index(index)? {
        let path = base.join(&entry);
        if entry.ends_with(".txt") {
            load_index(&path, resource_paths, features, visited)?;
            continue;
        }

        let xml = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read feature manifest: {}", path.display()))?;
        let feature = parse_feature_manifest(&xml, &path, resource_paths)?;
        debug!(
            "Loaded feature '{}' ({} dependencies) from {}",
            feature.name,
            feature.dependencies.len(),
            path.display()
        );
        features.push(Arc::new(feature));
    }
    Ok(())
}

/// Parse one feature manifest.
///
/// `manifest_path` locates local scripts (relative to its directory) and
/// names the manifest in errors.
///
/// # Errors
///
/// Returns [`GadgetError::FeatureManifestInvalid`] for malformed XML or a
/// missing `<name>`.
pub fn parse_feature_manifest(
    xml: &str,
    manifest_path: &Path,
    resource_paths: &[PathBuf],
) -> Result<FeatureDefinition> {
    let invalid = |reason: String| GadgetError::FeatureManifestInvalid {
        path: manifest_path.display().to_string(),
        reason,
    };

    let document = roxmltree::Document::parse(xml).map_err(|e| invalid(e.to_string()))?;
    let root = document.root_element();
    let feature_dir = manifest_path.parent().map(Path::to_path_buf).unwrap_or_default();

    let name = root
        .children()
        .find(|n| n.has_tag_name("name"))
        .map(|n| element_text(&n))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid("missing <name> element".to_string()))?;

    let mut feature = FeatureDefinition::new(name, Vec::new());
    feature.manifest_path = manifest_path.to_path_buf();

    for child in root.children().filter(roxmltree::Node::is_element) {
        let tag = child.tag_name().name();
        if tag == "dependency" {
            let dependency = element_text(&child);
            if !dependency.is_empty() {
                feature.dependencies.push(dependency);
            }
        } else if let Some(target) = TargetType::from_element_name(tag) {
            for script in child.children().filter(|n| n.has_tag_name("script")) {
                let definition = match script.attribute("src") {
                    Some(src) => ScriptDefinition::from_src(src.trim(), &feature_dir, resource_paths),
                    None => ScriptDefinition::Inline {
                        content: element_text(&script),
                    },
                };
                if !definition.is_resolved() {
                    warn!(
                        "Feature '{}': resource script {} not found under any resource path; it will be skipped",
                        feature.name,
                        definition.reference().unwrap_or_default()
                    );
                }
                feature.scripts.entry(target).or_default().push(definition);
            }
        }
    }

    Ok(feature)
}

/// Concatenated, trimmed text (including CDATA) beneath an element.
pub(crate) fn element_text(node: &roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(roxmltree::Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}
