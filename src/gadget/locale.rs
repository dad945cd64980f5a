//! Locales and their message bundles.
//!
//! A [`LocaleDefinition`] owns a [`MessageBundle`] that is either already
//! available (inline `<msg>` children) or still has to be fetched from its
//! `messages` URL. The transition happens in exactly one place,
//! [`LocaleDefinition::ensure_ready`]; reading an uninitialized bundle via
//! [`LocaleDefinition::messages`] is an error, never an empty map.
//!
//! Definitions are shared through the definition cache, so the bundle state
//! lives behind a lock. The lock is never held across a fetch: two racing
//! requests may both fetch the same bundle, and the first to finish
//! publishes it.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::core::GadgetError;
use crate::fetch::{FetchRequest, HttpFetcher, RequestDeadline, fetch_text};

/// Resolved key → text mapping of one locale.
pub type Messages = Arc<BTreeMap<String, String>>;

/// Language tag used when a locale applies to every language.
pub const ALL_LANGUAGES: &str = "all";

/// Country tag used when a locale applies to every country.
pub const ALL_COUNTRIES: &str = "ALL";

/// Message bundle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBundle {
    /// Not loaded yet; `source` is the absolute URL of the bundle document.
    Uninitialized {
        source: String,
    },
    /// Loaded and immutable.
    Ready {
        messages: Messages,
    },
}

impl MessageBundle {
    /// A bundle that is available immediately.
    pub fn ready(messages: BTreeMap<String, String>) -> Self {
        Self::Ready {
            messages: Arc::new(messages),
        }
    }

    /// Whether the bundle can be read without I/O.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// A `<Locale>` entry of a gadget manifest.
#[derive(Debug)]
pub struct LocaleDefinition {
    /// Language tag, `all` when absent.
    pub language: String,
    /// Country tag, `ALL` when absent.
    pub country: String,
    /// Text direction, `ltr` or `rtl`.
    pub direction: String,
    bundle: RwLock<MessageBundle>,
}

impl LocaleDefinition {
    /// Create a locale with the given bundle.
    pub fn new(
        language: impl Into<String>,
        country: impl Into<String>,
        direction: impl Into<String>,
        bundle: MessageBundle,
    ) -> Self {
        Self {
            language: language.into(),
            country: country.into(),
            direction: direction.into(),
            bundle: RwLock::new(bundle),
        }
    }

    /// Display form `lang_COUNTRY`.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.language, self.country)
    }

    /// Whether this locale is declared for exactly `language` and `country`
    /// (case-insensitive).
    pub fn matches(&self, language: &str, country: &str) -> bool {
        self.language.eq_ignore_ascii_case(language) && self.country.eq_ignore_ascii_case(country)
    }

    /// Snapshot of the bundle state.
    pub fn bundle(&self) -> MessageBundle {
        self.bundle.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages of a ready bundle.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::BundleNotReady`] when the bundle has not been
    /// initialized with [`LocaleDefinition::ensure_ready`].
    pub fn messages(&self) -> Result<Messages> {
        match &*self.bundle.read().unwrap_or_else(PoisonError::into_inner) {
            MessageBundle::Ready {
                messages,
            } => Ok(Arc::clone(messages)),
            MessageBundle::Uninitialized { .. } => Err(GadgetError::BundleNotReady {
                locale: self.tag(),
            }
            .into()),
        }
    }

    /// Make the bundle ready, fetching it when needed, and return its
    /// messages.
    ///
    /// # Errors
    ///
    /// Fails when the bundle document cannot be fetched within `deadline`
    /// or cannot be parsed.
    pub async fn ensure_ready(
        &self,
        fetcher: &dyn HttpFetcher,
        deadline: &RequestDeadline,
    ) -> Result<Messages> {
        let source = match self.bundle() {
            MessageBundle::Ready {
                messages,
            } => return Ok(messages),
            MessageBundle::Uninitialized {
                source,
            } => source,
        };

        debug!("Fetching message bundle {} for locale {}", source, self.tag());
        let body =
            fetch_text(fetcher, deadline, &FetchRequest::get(source.as_str()), "message bundle fetch").await?;
        let parsed = Arc::new(parse_message_bundle(&body, &source)?);

        let mut bundle = self.bundle.write().unwrap_or_else(PoisonError::into_inner);
        match &*bundle {
            MessageBundle::Ready {
                messages,
            } => Ok(Arc::clone(messages)),
            MessageBundle::Uninitialized { .. } => {
                *bundle = MessageBundle::Ready {
                    messages: Arc::clone(&parsed),
                };
                Ok(parsed)
            }
        }
    }
}

/// Parse a `<messagebundle>` document.
///
/// ```xml
/// <messagebundle>
///   <msg name="hello">Hello, world</msg>
/// </messagebundle>
/// ```
///
/// # Errors
///
/// Fails for malformed XML and for `<msg>` elements without `name`.
pub fn parse_message_bundle(xml: &str, uri: &str) -> Result<BTreeMap<String, String>> {
    let document = roxmltree::Document::parse(xml).map_err(|e| GadgetError::ManifestParseError {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;
    collect_messages(document.root_element())
        .with_context(|| format!("Invalid message bundle {uri}"))
}

/// Collect `<msg name="...">` children of `node`.
pub(crate) fn collect_messages(node: roxmltree::Node<'_, '_>) -> Result<BTreeMap<String, String>> {
    let mut messages = BTreeMap::new();
    for msg in node.children().filter(|n| n.has_tag_name("msg")) {
        let name = msg.attribute("name").ok_or_else(|| GadgetError::MissingAttribute {
            element: "msg".to_string(),
            attribute: "name".to_string(),
        })?;
        messages.insert(name.to_string(), crate::features::element_text(&msg));
    }
    Ok(messages)
}

/// Pick the locale for a request: exact match, then the language for all
/// countries, then the catch-all locale.
pub fn find_locale<'a>(
    locales: &'a [LocaleDefinition],
    language: &str,
    country: &str,
) -> Option<&'a LocaleDefinition> {
    [(language, country), (language, ALL_COUNTRIES), (ALL_LANGUAGES, ALL_COUNTRIES)]
        .into_iter()
        .find_map(|(lang, ctry)| locales.iter().find(|locale| locale.matches(lang, ctry)))
}
