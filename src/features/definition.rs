//! Feature and script definitions.
//!
//! A feature is a named bundle of JavaScript with dependencies on other
//! features, referenced by name. Its scripts are grouped by the kind of page
//! they are meant for: the gadget iframe, the embedding container, or both.

use anyhow::{Context, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Page type a script is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Scripts for the gadget iframe.
    Gadget,
    /// Scripts for the embedding container page.
    Container,
    /// Scripts for both.
    All,
}

impl TargetType {
    /// Element name used for this target in feature manifests.
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::Gadget => "gadget",
            Self::Container => "container",
            Self::All => "all",
        }
    }

    /// Parse a feature manifest element name.
    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "gadget" => Some(Self::Gadget),
            "container" => Some(Self::Container),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// One script of a feature.
#[derive(Debug, Clone)]
pub enum ScriptDefinition {
    /// Literal source text embedded in the manifest.
    Inline {
        /// Script source.
        content: String,
    },
    /// File next to the feature manifest; read on first access.
    Local {
        /// `src` attribute as written in the manifest.
        reference: String,
        /// Absolute path of the file.
        path: PathBuf,
        /// Cached file content.
        content: OnceLock<String>,
    },
    /// Absolute `http://` URL; never resolved locally.
    Remote {
        /// Script URL.
        url: String,
    },
    /// `res://` reference looked up in the container's resource roots.
    Resource {
        /// `src` attribute as written in the manifest.
        reference: String,
        /// Resolved path, `None` when no root contains the file.
        source: Option<PathBuf>,
    },
}

impl ScriptDefinition {
    /// Classify a `src` attribute.
    ///
    /// `http://` and `https://` sources are remote, `res://` sources are
    /// resolved against `resource_paths` (first existing match wins) and
    /// anything else is a path relative to `feature_dir`.
    pub fn from_src(src: &str, feature_dir: &Path, resource_paths: &[PathBuf]) -> Self {
        if src.starts_with("http://") || src.starts_with("https://") {
            Self::Remote {
                url: src.to_string(),
            }
        } else if let Some(relative) = src.strip_prefix("res://") {
            let source = resource_paths
                .iter()
                .map(|root| root.join(relative))
                .find(|candidate| candidate.exists());
            Self::Resource {
                reference: src.to_string(),
                source,
            }
        } else {
            Self::Local {
                reference: src.to_string(),
                path: feature_dir.join(src),
                content: OnceLock::new(),
            }
        }
    }

    /// Short name of the script kind, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Inline { .. } => "inline",
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
            Self::Resource { .. } => "resource",
        }
    }

    /// The `src` attribute this script was declared with, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Inline { .. } => None,
            Self::Local { reference, .. } | Self::Resource { reference, .. } => Some(reference),
            Self::Remote { url } => Some(url),
        }
    }

    /// Whether the script can be delivered at all.
    ///
    /// A resource script whose file was not found under any resource root is
    /// unusable and must be skipped by consumers.
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Resource { source: None, .. })
    }

    /// Script source text, when it is available locally.
    ///
    /// Inline scripts return their text. Local scripts are read on the first
    /// call and served from memory afterwards. Resolved resource scripts are
    /// read from their resolved path. Remote and unresolved resource scripts
    /// return `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when a local or resource file cannot be read.
    pub fn content(&self) -> Result<Option<Cow<'_, str>>> {
        match self {
            Self::Inline { content } => Ok(Some(Cow::Borrowed(content))),
            Self::Local { path, content, .. } => {
                if let Some(cached) = content.get() {
                    return Ok(Some(Cow::Borrowed(cached)));
                }
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read feature script: {}", path.display()))?;
                // A concurrent reader may have won the race; either copy is identical.
                let _ = content.set(text);
                Ok(content.get().map(|cached| Cow::Borrowed(cached.as_str())))
            }
            Self::Resource { source: Some(path), .. } => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read resource script: {}", path.display()))?;
                Ok(Some(Cow::Owned(text)))
            }
            Self::Remote { .. } | Self::Resource { source: None, .. } => Ok(None),
        }
    }
}

/// A named JavaScript capability bundle.
#[derive(Debug, Clone)]
pub struct FeatureDefinition {
    /// Unique name within its feature set.
    pub name: String,
    /// Names of features this one depends on, in declaration order.
    pub dependencies: Vec<String>,
    /// Scripts grouped by target, each list in declaration order.
    pub scripts: BTreeMap<TargetType, Vec<ScriptDefinition>>,
    /// Path of the manifest this feature was loaded from.
    pub manifest_path: PathBuf,
}

impl FeatureDefinition {
    /// Create a feature with no scripts.
    pub fn new(name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            dependencies,
            scripts: BTreeMap::new(),
            manifest_path: PathBuf::new(),
        }
    }

    /// Add a script for a target.
    #[must_use]
    pub fn with_script(mut self, target: TargetType, script: ScriptDefinition) -> Self {
        self.scripts.entry(target).or_default().push(script);
        self
    }

    /// Scripts declared for exactly `target`.
    pub fn scripts_for(&self, target: TargetType) -> &[ScriptDefinition] {
        self.scripts.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Scripts delivered to a page of type `target`: the `all` scripts
    /// followed by the target-specific ones.
    pub fn delivered_scripts(&self, target: TargetType) -> impl Iterator<Item = &ScriptDefinition> {
        let specific = if target == TargetType::All {
            &[][..]
        } else {
            self.scripts_for(target)
        };
        self.scripts_for(TargetType::All).iter().chain(specific.iter())
    }

    /// Whether the feature ships anything for `target` pages.
    pub fn targets(&self, target: TargetType) -> bool {
        self.delivered_scripts(target).next().is_some()
    }
}
