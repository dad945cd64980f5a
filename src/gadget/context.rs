//! Request-scoped rendering context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{GadgetDefinition, LocaleDefinition, Preload, View};
use crate::constants::DEFAULT_VIEW;

/// Output shape of a rendered gadget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// A complete `<html><head/><body/></html>` document.
    #[default]
    Iframe,
    /// A single wrapper element for embedding in a host page.
    Inline,
}

impl RenderMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Iframe => "iframe",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the request, as issued by the (external) token service.
///
/// The renderer only uses the owner and viewer ids, to scope preload
/// results per viewer.
pub trait SecurityToken: fmt::Debug + Send + Sync {
    fn owner_id(&self) -> &str;
    fn viewer_id(&self) -> &str;
}

/// A [`SecurityToken`] holding plain ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicSecurityToken {
    pub owner: String,
    pub viewer: String,
}

impl BasicSecurityToken {
    pub fn new(owner: impl Into<String>, viewer: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            viewer: viewer.into(),
        }
    }
}

impl SecurityToken for BasicSecurityToken {
    fn owner_id(&self) -> &str {
        &self.owner
    }

    fn viewer_id(&self) -> &str {
        &self.viewer
    }
}

/// Everything a request says about how to render a gadget.
#[derive(Debug, Clone)]
pub struct GadgetContext {
    pub container: String,
    /// Manifest URL.
    pub url: String,
    pub view: String,
    pub language: String,
    pub country: String,
    pub mode: RenderMode,
    /// Request overrides for user preferences.
    pub user_prefs: BTreeMap<String, String>,
    pub token: Arc<dyn SecurityToken>,
}

impl GadgetContext {
    /// Context for rendering `url` in `container` with default view, locale
    /// `en_US`, iframe mode and an anonymous token.
    pub fn new(container: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            url: url.into(),
            view: DEFAULT_VIEW.to_string(),
            language: "en".to_string(),
            country: "US".to_string(),
            mode: RenderMode::Iframe,
            user_prefs: BTreeMap::new(),
            token: Arc::new(BasicSecurityToken::default()),
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = view.into();
        self
    }

    #[must_use]
    pub fn with_locale(mut self, language: impl Into<String>, country: impl Into<String>) -> Self {
        self.language = language.into();
        self.country = country.into();
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_user_pref(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_prefs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: Arc<dyn SecurityToken>) -> Self {
        self.token = token;
        self
    }
}

/// A definition paired with one request's context.
#[derive(Debug, Clone)]
pub struct Gadget {
    pub definition: Arc<GadgetDefinition>,
    pub context: GadgetContext,
}

impl Gadget {
    pub const fn new(definition: Arc<GadgetDefinition>, context: GadgetContext) -> Self {
        Self {
            definition,
            context,
        }
    }

    /// Views selected by the requested view name.
    pub fn current_views(&self) -> Vec<&View> {
        self.definition.views_for(&self.context.view)
    }

    /// Name of the view actually rendered (after fallback).
    pub fn current_view_name(&self) -> &str {
        self.current_views().first().map_or(self.context.view.as_str(), |view| view.name.as_str())
    }

    /// Effective user preference values: the request override when given,
    /// otherwise the declared default.
    pub fn user_pref_values(&self) -> BTreeMap<String, String> {
        self.definition
            .user_prefs
            .iter()
            .map(|pref| {
                let value = self
                    .context
                    .user_prefs
                    .get(&pref.name)
                    .cloned()
                    .unwrap_or_else(|| pref.default_value.clone());
                (pref.name.clone(), value)
            })
            .collect()
    }

    /// Locale matching the request language and country.
    pub fn locale(&self) -> Option<&LocaleDefinition> {
        self.definition.locale(&self.context.language, &self.context.country)
    }

    /// Preloads declared for the rendered view.
    pub fn preloads(&self) -> Vec<&Preload> {
        let view = self.current_view_name();
        self.definition.module_prefs.preloads_for(view).collect()
    }
}
