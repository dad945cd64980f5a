//! Feature stage: inject the gadget's feature scripts.
//!
//! The script set is the container's core features followed by the resolved
//! `Require` and `Optional` features of the gadget, dependency-first and
//! without duplicates. Inline scripts are embedded and remote scripts keep
//! their URL. The local and resource scripts of a feature are served as one
//! file, `{js_endpoint}/{feature}.js`, referenced where the first of them is
//! declared.

use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::constants::SERVED_SCRIPT_SUFFIX;
use crate::container::Container;
use crate::document::{MutableDocument, external_script, inline_script, script_node};
use crate::features::{FeatureDefinition, ScriptDefinition, TargetType};
use crate::gadget::{Gadget, RenderMode};

/// Every feature a gadget needs in `container`, dependency-first.
///
/// # Errors
///
/// Returns [`crate::core::GadgetError::FeatureNotFound`] when the gadget
/// references a feature the container does not provide.
pub fn gadget_features(container: &Container, gadget: &Gadget) -> Result<Vec<Arc<FeatureDefinition>>> {
    let requested = gadget.definition.module_prefs.features.iter().map(|f| f.name.as_str());
    let resolved = container.graph().resolve_all(requested)?;

    let mut seen = HashSet::new();
    Ok(container
        .core_features()
        .iter()
        .chain(resolved.iter())
        .filter(|feature| seen.insert(feature.name.clone()))
        .cloned()
        .collect())
}

/// Injects `<script>` elements for the gadget's features.
#[derive(Debug, Clone)]
pub struct FeatureModule {
    js_endpoint: String,
}

impl FeatureModule {
    pub fn new(js_endpoint: &str) -> Self {
        Self {
            js_endpoint: js_endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// URL under which the JS endpoint serves the file-backed scripts of `feature`.
    fn script_url(&self, feature: &str) -> String {
        format!("{}/{}{}", self.js_endpoint, feature, SERVED_SCRIPT_SUFFIX)
    }
}

impl GadgetRenderModule for FeatureModule {
    fn stage(&self) -> RenderStage {
        RenderStage::Feature
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let features = gadget_features(context.container, context.gadget)?;
            debug!(
                "Injecting {} feature(s): {}",
                features.len(),
                features.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
            );

            let mut scripts = Vec::new();
            for feature in &features {
                let mut served = false;
                for script in feature.delivered_scripts(TargetType::Gadget) {
                    let node = match script {
                        ScriptDefinition::Inline {
                            content,
                        } => inline_script(document, content),
                        ScriptDefinition::Remote {
                            url,
                        } => external_script(document, url),
                        ScriptDefinition::Local {
                            ..
                        }
                        | ScriptDefinition::Resource {
                            source: Some(_), ..
                        } => {
                            if served {
                                continue;
                            }
                            served = true;
                            external_script(document, &self.script_url(&feature.name))
                        }
                        ScriptDefinition::Resource {
                            reference,
                            source: None,
                        } => {
                            warn!("Skipping unresolved script {} of feature '{}'", reference, feature.name);
                            continue;
                        }
                    };
                    scripts.push(node);
                }
            }

            let mode = context.gadget.context.mode;
            let target = script_node(&*document, mode)?;
            match mode {
                RenderMode::Iframe => {
                    for node in scripts {
                        document.append_child(target, node);
                    }
                }
                RenderMode::Inline => match document.children(target).first().copied() {
                    Some(first) => {
                        for node in scripts {
                            document.insert_before(target, node, first);
                        }
                    }
                    None => {
                        for node in scripts {
                            document.append_child(target, node);
                        }
                    }
                },
            }
            Ok(())
        })
    }
}
