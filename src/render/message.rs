//! Localization stage.
//!
//! When a locale matches the request, its bundle is made ready (fetching it
//! if necessary), `__MSG_key__` tokens are replaced throughout the document
//! and the message table is handed to the client. A token whose key is not
//! in the bundle renders as the bare key. Without a matching locale the
//! stage does nothing.

use anyhow::Result;
use futures::future::BoxFuture;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::debug;

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::constants::MESSAGE_PATTERN;
use crate::document::{MutableDocument, content_node, inline_script, rewrite_markup, script_node, text_roots};
use crate::utils::script_json;

#[derive(Debug, Clone)]
pub struct MessageModule {
    pattern: Regex,
}

impl MessageModule {
    /// # Errors
    ///
    /// Fails when the placeholder pattern does not compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(MESSAGE_PATTERN)?,
        })
    }

    /// Substitute messages in `text`.
    pub fn substitute(&self, text: &str, messages: &BTreeMap<String, String>) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| {
                messages.get(&caps[1]).cloned().unwrap_or_else(|| caps[1].to_string())
            })
            .into_owned()
    }
}

impl GadgetRenderModule for MessageModule {
    fn stage(&self) -> RenderStage {
        RenderStage::Message
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = &context.gadget.context;
            let Some(locale) = context.gadget.locale() else {
                debug!("No locale for {}_{}; skipping localization", request.language, request.country);
                return Ok(());
            };

            let messages = locale.ensure_ready(context.fetcher, &context.deadline).await?;
            debug!("Localizing with {} ({} messages)", locale.tag(), messages.len());

            for root in text_roots(&*document, request.mode)? {
                rewrite_markup(document, root, &mut |text: &str| self.substitute(text, &messages));
            }

            if locale.direction == "rtl" {
                let content = content_node(&*document, request.mode)?;
                document.set_attribute(content, "dir", "rtl");
            }

            let script = format!("gadgets.Prefs.setMessages_({});", script_json(&*messages)?);
            let target = script_node(&*document, request.mode)?;
            let node = inline_script(document, &script);
            document.append_child(target, node);
            Ok(())
        })
    }
}
