//! Util stage: preloads, module id, config init and on-load handlers.
//!
//! Preloads missing from the preload cache are fetched concurrently; a
//! failed preload is logged and left out. The init script carries the
//! container settings with a `core.util` section holding the parameters of
//! every feature the gadget references, followed by the cached preload
//! results. It goes first in the body (iframe) or last in the wrapper
//! (inline). The on-load script is always the final node of the content.

use anyhow::Result;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::cache::PreloadKey;
use crate::constants::{CORE_UTIL_SECTION, MODULE_ID_TOKEN, MODULE_ID_VALUE};
use crate::document::{MutableDocument, content_node, inline_script, rewrite_markup, text_roots};
use crate::fetch::{FetchRequest, fetch_text};
use crate::gadget::{Gadget, Preload, RenderMode};
use crate::utils::script_json;

/// Client call that runs the gadget's registered on-load handlers.
pub const RUN_ON_LOAD_HANDLERS: &str = "gadgets.util.runOnLoadHandlers();";

#[derive(Debug, Clone, Copy, Default)]
pub struct UtilModule;

impl UtilModule {
    pub const fn new() -> Self {
        Self
    }

    fn preload_key(gadget: &Gadget, preload: &Preload) -> PreloadKey {
        let token = &gadget.context.token;
        PreloadKey::new(preload.href.as_str(), token.owner_id(), token.viewer_id())
    }

    async fn run_preloads(context: &RenderContext<'_>) {
        let cache = context.caches.preloads();
        let pending: Vec<(&Preload, PreloadKey)> = context
            .gadget
            .preloads()
            .into_iter()
            .map(|preload| (preload, Self::preload_key(context.gadget, preload)))
            .filter(|(_, key)| !cache.contains(key))
            .collect();
        if pending.is_empty() {
            return;
        }
        debug!("Fetching {} preload(s)", pending.len());

        let fetches = pending.into_iter().map(|(preload, key)| async move {
            let request = FetchRequest::get(preload.href.as_str());
            match fetch_text(context.fetcher, &context.deadline, &request, "preload fetch").await {
                Ok(body) => {
                    cache.insert_if_absent(key, json!({ "id": preload.href, "rc": 200, "body": body }));
                }
                Err(e) => warn!("Preload of {} failed: {}", preload.href, e),
            }
        });
        join_all(fetches).await;
    }

    /// Container settings merged with the `core.util` feature parameters.
    pub fn init_config(context: &RenderContext<'_>) -> Value {
        let mut config = match context.container.settings() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let mut core_util = match config.remove(CORE_UTIL_SECTION) {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        for feature in &context.gadget.definition.module_prefs.features {
            let params: Map<String, Value> =
                feature.params.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
            core_util.insert(feature.name.clone(), Value::Object(params));
        }
        config.insert(CORE_UTIL_SECTION.to_string(), Value::Object(core_util));
        Value::Object(config)
    }
}

impl GadgetRenderModule for UtilModule {
    fn stage(&self) -> RenderStage {
        RenderStage::Util
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Self::run_preloads(context).await;

            let mode = context.gadget.context.mode;
            for root in text_roots(&*document, mode)? {
                rewrite_markup(document, root, &mut |text: &str| text.replace(MODULE_ID_TOKEN, MODULE_ID_VALUE));
            }

            let cache = context.caches.preloads();
            let preloaded: Vec<Value> = context
                .gadget
                .preloads()
                .into_iter()
                .filter_map(|preload| cache.get(&Self::preload_key(context.gadget, preload)))
                .collect();

            let init = format!(
                "gadgets.config.init({});\ngadgets.io.preloaded_ = {};",
                script_json(&Self::init_config(context))?,
                script_json(&preloaded)?
            );

            let content = content_node(&*document, mode)?;
            let init_node = inline_script(document, &init);
            match mode {
                RenderMode::Iframe => document.prepend_child(content, init_node),
                RenderMode::Inline => document.append_child(content, init_node),
            }

            let on_load = inline_script(document, RUN_ON_LOAD_HANDLERS);
            document.append_child(content, on_load);
            Ok(())
        })
    }
}
