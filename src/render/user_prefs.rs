//! User preferences stage.
//!
//! Replaces `__UP_name__` tokens in the gadget content with the effective
//! (HTML-escaped) preference values and hands the full preference map to
//! the client. Tokens naming an undeclared preference stay as they are.

use anyhow::Result;
use futures::future::BoxFuture;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

use super::{GadgetRenderModule, RenderContext, RenderStage};
use crate::constants::USER_PREF_PATTERN;
use crate::document::{MutableDocument, content_node, inline_script, rewrite_content, script_node};
use crate::utils::{html_escape, script_json};

#[derive(Debug, Clone)]
pub struct UserPreferencesModule {
    pattern: Regex,
}

impl UserPreferencesModule {
    /// # Errors
    ///
    /// Fails when the placeholder pattern does not compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(USER_PREF_PATTERN)?,
        })
    }

    /// Substitute known preferences in `text`.
    pub fn substitute(&self, text: &str, values: &BTreeMap<String, String>) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| match values.get(&caps[1]) {
                Some(value) => html_escape(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl GadgetRenderModule for UserPreferencesModule {
    fn stage(&self) -> RenderStage {
        RenderStage::UserPreferences
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let values = context.gadget.user_pref_values();
            let mode = context.gadget.context.mode;

            let content = content_node(&*document, mode)?;
            rewrite_content(document, content, &mut |text: &str| self.substitute(text, &values));

            let script = format!("gadgets.Prefs.setDefaultPrefs_({});", script_json(&values)?);
            let target = script_node(&*document, mode)?;
            let node = inline_script(document, &script);
            document.append_child(target, node);
            Ok(())
        })
    }
}
