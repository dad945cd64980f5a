//! Gadget definitions and per-request gadgets.
//!
//! A [`GadgetDefinition`] is the typed form of a gadget manifest. It is
//! built once by [`GadgetParser`], published to the definition cache and
//! never mutated afterwards (the message bundles of its locales are the one
//! exception, see [`locale`]).
//!
//! A [`Gadget`] pairs a shared definition with one request's
//! [`GadgetContext`] and lives only as long as that request.

pub mod context;
pub mod locale;
mod parser;

pub use context::{BasicSecurityToken, Gadget, GadgetContext, RenderMode, SecurityToken};
pub use locale::{LocaleDefinition, MessageBundle, Messages, find_locale};
pub use parser::GadgetParser;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::DEFAULT_VIEW;
use crate::core::GadgetError;

/// Typed gadget manifest.
#[derive(Debug)]
pub struct GadgetDefinition {
    /// URI the manifest was fetched from.
    pub uri: String,
    /// The `ModulePrefs` section.
    pub module_prefs: ModulePrefs,
    /// Declared user preferences, in manifest order.
    pub user_prefs: Vec<UserPref>,
    /// Content views, one per declared view name.
    pub views: Vec<View>,
}

impl GadgetDefinition {
    /// Views to render for `name`: every view with that name, or when none
    /// exists, every view sharing the first declared view's name.
    pub fn views_for(&self, name: &str) -> Vec<&View> {
        let matching: Vec<&View> = self.views.iter().filter(|view| view.name == name).collect();
        if !matching.is_empty() {
            return matching;
        }
        match self.views.first() {
            Some(first) => self.views.iter().filter(|view| view.name == first.name).collect(),
            None => Vec::new(),
        }
    }

    /// Distinct view names in declaration order.
    pub fn view_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for view in &self.views {
            if !names.contains(&view.name.as_str()) {
                names.push(&view.name);
            }
        }
        names
    }

    /// Look a user preference up by name.
    pub fn user_pref(&self, name: &str) -> Option<&UserPref> {
        self.user_prefs.iter().find(|pref| pref.name == name)
    }

    /// Locale for a request language/country, with fallback.
    pub fn locale(&self, language: &str, country: &str) -> Option<&LocaleDefinition> {
        find_locale(&self.module_prefs.locales, language, country)
    }
}

/// The `ModulePrefs` section of a manifest.
#[derive(Debug, Default)]
pub struct ModulePrefs {
    /// Header attributes, verbatim.
    pub attributes: BTreeMap<String, String>,
    /// `Require` and `Optional` feature references, in manifest order.
    pub features: Vec<FeatureRef>,
    /// Declared locales.
    pub locales: Vec<LocaleDefinition>,
    /// Declared preloads.
    pub preloads: Vec<Preload>,
    /// `OAuth` and `OAuth2` consumer services.
    pub oauth_services: Vec<OAuthService>,
    /// Icons.
    pub icons: Vec<Icon>,
    /// Links.
    pub links: Vec<Link>,
}

impl ModulePrefs {
    /// A header attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `title` attribute, empty when absent.
    pub fn title(&self) -> &str {
        self.attribute("title").unwrap_or_default()
    }

    /// `Require`d feature references.
    pub fn required_features(&self) -> impl Iterator<Item = &FeatureRef> {
        self.features.iter().filter(|feature| feature.required)
    }

    /// `Optional` feature references.
    pub fn optional_features(&self) -> impl Iterator<Item = &FeatureRef> {
        self.features.iter().filter(|feature| !feature.required)
    }

    /// Preloads that apply to `view`.
    pub fn preloads_for<'a>(&'a self, view: &'a str) -> impl Iterator<Item = &'a Preload> {
        self.preloads.iter().filter(move |preload| preload.applies_to(view))
    }
}

/// A `Require` or `Optional` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub name: String,
    pub required: bool,
    /// `Param` children, name → value.
    pub params: BTreeMap<String, String>,
}

/// A `Preload` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preload {
    /// Absolute URL to prefetch.
    pub href: String,
    /// Authorization type, `none` by default.
    pub authz: String,
    pub sign_owner: bool,
    pub sign_viewer: bool,
    /// Views the preload is limited to; empty means all views.
    pub views: Vec<String>,
}

impl Preload {
    /// Whether the preload runs when rendering `view`.
    pub fn applies_to(&self, view: &str) -> bool {
        self.views.is_empty() || self.views.iter().any(|v| v == view)
    }
}

/// OAuth protocol generation of a consumer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthVersion {
    OAuth1,
    OAuth2,
}

/// An `OAuth`/`OAuth2` `Service` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthService {
    pub name: String,
    pub version: OAuthVersion,
    /// Requested scope (OAuth2 only).
    pub scope: Option<String>,
    /// Endpoints keyed by lower-cased element name (`request`, `access`,
    /// `authorization`, `token`).
    pub endpoints: BTreeMap<String, OAuthEndpoint>,
}

/// One endpoint of an OAuth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoint {
    pub url: String,
    /// HTTP method, `POST` by default.
    pub method: String,
    /// Where OAuth parameters go, `auth-header` by default.
    pub param_location: String,
}

/// An `Icon` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub mode: Option<String>,
    pub mime_type: Option<String>,
    /// URL or inline (base64) data.
    pub content: String,
}

/// A `Link` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// Datatype of a user preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    String,
    Hidden,
    Bool,
    List,
    Enum,
}

impl DataType {
    /// Lower-case manifest spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Hidden => "hidden",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Enum => "enum",
        }
    }
}

impl FromStr for DataType {
    type Err = GadgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "hidden" => Ok(Self::Hidden),
            "bool" => Ok(Self::Bool),
            "list" => Ok(Self::List),
            "enum" => Ok(Self::Enum),
            _ => Err(GadgetError::InvalidAttribute {
                element: "UserPref".to_string(),
                attribute: "datatype".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `EnumValue` of an enum user preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub value: String,
    /// Display text, equal to `value` when not declared.
    pub display_value: String,
}

/// A `UserPref` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPref {
    pub name: String,
    pub display_name: String,
    pub default_value: String,
    pub required: bool,
    pub datatype: DataType,
    pub enum_values: Vec<EnumValue>,
}

/// How a view's content is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Html,
    Url,
}

impl ContentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Url => "url",
        }
    }
}

impl FromStr for ContentType {
    type Err = GadgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "url" => Ok(Self::Url),
            _ => Err(GadgetError::InvalidAttribute {
                element: "Content".to_string(),
                attribute: "type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// One view of a `Content` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub content_type: ContentType,
    /// Inline markup, empty for views whose content lives at `href`.
    pub content: String,
    /// Absolute URL of remote content.
    pub href: Option<String>,
    pub preferred_height: u32,
    pub preferred_width: u32,
}

impl View {
    /// Whether rendering this view requires fetching `href`.
    pub fn needs_fetch(&self) -> bool {
        self.href.is_some() && self.content.is_empty()
    }
}

impl Default for View {
    fn default() -> Self {
        Self {
            name: DEFAULT_VIEW.to_string(),
            content_type: ContentType::Html,
            content: String::new(),
            href: None,
            preferred_height: 0,
            preferred_width: 0,
        }
    }
}
