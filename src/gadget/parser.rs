//! Gadget manifest parser.
//!
//! ```xml
//! <Module>
//!   <ModulePrefs title="Hello">
//!     <Require feature="views"><Param name="mode">full</Param></Require>
//!     <Locale lang="en" messages="messages/en.xml"/>
//!     <Preload href="http://example.com/data.json" views="canvas"/>
//!   </ModulePrefs>
//!   <UserPref name="color" datatype="enum" default_value="red">
//!     <EnumValue value="red" display_value="Red"/>
//!     <EnumValue value="blue"/>
//!   </UserPref>
//!   <Content view="home,canvas"><![CDATA[ Hello __UP_color__ ]]></Content>
//! </Module>
//! ```
//!
//! Parsing is a pure function of the document text and the base URI.
//! Malformed required attributes are errors: a manifest never turns into a
//! partially valid definition.

use anyhow::{Context, Result};
use roxmltree::Node;
use std::collections::BTreeMap;
use url::Url;

use super::locale::{ALL_COUNTRIES, ALL_LANGUAGES, collect_messages};
use super::{
    ContentType, DataType, EnumValue, FeatureRef, GadgetDefinition, Icon, LocaleDefinition, Link,
    MessageBundle, ModulePrefs, OAuthEndpoint, OAuthService, OAuthVersion, Preload, UserPref, View,
};
use crate::constants::DEFAULT_VIEW;
use crate::core::GadgetError;
use crate::features::element_text;

/// Parser for gadget manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct GadgetParser;

impl GadgetParser {
    /// Parse `xml`, resolving relative URLs against `base_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::ManifestParseError`] for malformed XML or a
    /// document without exactly one `ModulePrefs`, and
    /// [`GadgetError::MissingAttribute`] / [`GadgetError::InvalidAttribute`]
    /// for malformed elements.
    pub fn parse(&self, xml: &str, base_uri: &str) -> Result<GadgetDefinition> {
        let malformed = |reason: String| GadgetError::ManifestParseError {
            uri: base_uri.to_string(),
            reason,
        };

        let document = roxmltree::Document::parse(xml).map_err(|e| malformed(e.to_string()))?;
        let root = document.root_element();
        let base = UriResolver::new(base_uri);

        let module_prefs: Vec<Node<'_, '_>> = children(root, "ModulePrefs").collect();
        let [prefs_node] = module_prefs.as_slice() else {
            return Err(malformed(format!(
                "expected exactly one ModulePrefs element, found {}",
                module_prefs.len()
            ))
            .into());
        };

        let module_prefs = parse_module_prefs(*prefs_node, &base)
            .with_context(|| format!("Invalid ModulePrefs in {base_uri}"))?;
        let user_prefs = children(root, "UserPref")
            .map(parse_user_pref)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid UserPref in {base_uri}"))?;

        let mut views = Vec::new();
        for content in children(root, "Content") {
            views.extend(
                parse_content(content, &base).with_context(|| format!("Invalid Content in {base_uri}"))?,
            );
        }

        Ok(GadgetDefinition {
            uri: base_uri.to_string(),
            module_prefs,
            user_prefs,
            views,
        })
    }
}

/// Resolves manifest-relative references against the manifest URI.
struct UriResolver<'a> {
    base: &'a str,
}

impl<'a> UriResolver<'a> {
    const fn new(base: &'a str) -> Self {
        Self {
            base,
        }
    }

    fn resolve(&self, reference: &str) -> Result<String> {
        if let Ok(absolute) = Url::parse(reference) {
            return Ok(absolute.to_string());
        }
        let base = Url::parse(self.base).map_err(GadgetError::from)?;
        Ok(base.join(reference).map_err(GadgetError::from)?.to_string())
    }
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.has_tag_name(tag))
}

fn required_attr<'a>(node: Node<'a, '_>, attribute: &str) -> Result<&'a str> {
    node.attribute(attribute).ok_or_else(|| {
        GadgetError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute: attribute.to_string(),
        }
        .into()
    })
}

fn invalid(node: Node<'_, '_>, attribute: &str, value: &str) -> GadgetError {
    GadgetError::InvalidAttribute {
        element: node.tag_name().name().to_string(),
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

fn bool_attr(node: Node<'_, '_>, attribute: &str, default: bool) -> Result<bool> {
    match node.attribute(attribute).map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(invalid(node, attribute, value).into()),
    }
}

fn u32_attr(node: Node<'_, '_>, attribute: &str) -> Result<u32> {
    match node.attribute(attribute).map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value.parse().map_err(|_| invalid(node, attribute, value).into()),
    }
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_module_prefs(node: Node<'_, '_>, base: &UriResolver<'_>) -> Result<ModulePrefs> {
    let mut prefs = ModulePrefs {
        attributes: node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect(),
        ..ModulePrefs::default()
    };

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "Require" => prefs.features.push(parse_feature_ref(child, true)?),
            "Optional" => prefs.features.push(parse_feature_ref(child, false)?),
            "Locale" => prefs.locales.push(parse_locale(child, base)?),
            "Preload" => prefs.preloads.push(parse_preload(child, base)?),
            "OAuth" => prefs.oauth_services.extend(parse_oauth(child, OAuthVersion::OAuth1)?),
            "OAuth2" => prefs.oauth_services.extend(parse_oauth(child, OAuthVersion::OAuth2)?),
            "Icon" => prefs.icons.push(Icon {
                mode: child.attribute("mode").map(ToString::to_string),
                mime_type: child.attribute("type").map(ToString::to_string),
                content: element_text(&child),
            }),
            "Link" => prefs.links.push(Link {
                rel: required_attr(child, "rel")?.to_string(),
                href: base.resolve(required_attr(child, "href")?)?,
            }),
            _ => {}
        }
    }
    Ok(prefs)
}

fn parse_feature_ref(node: Node<'_, '_>, required: bool) -> Result<FeatureRef> {
    let name = required_attr(node, "feature")?.trim();
    if name.is_empty() {
        return Err(invalid(node, "feature", name).into());
    }
    let mut params = BTreeMap::new();
    for param in children(node, "Param") {
        params.insert(required_attr(param, "name")?.to_string(), element_text(&param));
    }
    Ok(FeatureRef {
        name: name.to_string(),
        required,
        params,
    })
}

fn parse_locale(node: Node<'_, '_>, base: &UriResolver<'_>) -> Result<LocaleDefinition> {
    let language = node.attribute("lang").filter(|v| !v.is_empty()).unwrap_or(ALL_LANGUAGES);
    let country = node.attribute("country").filter(|v| !v.is_empty()).unwrap_or(ALL_COUNTRIES);
    let direction = match node.attribute("language_direction") {
        None | Some("") => "ltr",
        Some(value @ ("ltr" | "rtl")) => value,
        Some(value) => return Err(invalid(node, "language_direction", value).into()),
    };

    let inline = collect_messages(node)?;
    let bundle = match node.attribute("messages") {
        Some(messages) if inline.is_empty() => MessageBundle::Uninitialized {
            source: base.resolve(messages)?,
        },
        _ => MessageBundle::ready(inline),
    };
    Ok(LocaleDefinition::new(language, country, direction, bundle))
}

fn parse_preload(node: Node<'_, '_>, base: &UriResolver<'_>) -> Result<Preload> {
    Ok(Preload {
        href: base.resolve(required_attr(node, "href")?)?,
        authz: node.attribute("authz").unwrap_or("none").to_ascii_lowercase(),
        sign_owner: bool_attr(node, "sign_owner", true)?,
        sign_viewer: bool_attr(node, "sign_viewer", true)?,
        views: node.attribute("views").map(comma_list).unwrap_or_default(),
    })
}

fn parse_oauth(node: Node<'_, '_>, version: OAuthVersion) -> Result<Vec<OAuthService>> {
    children(node, "Service")
        .map(|service| -> Result<OAuthService> {
            let mut endpoints = BTreeMap::new();
            for endpoint in service.children().filter(Node::is_element) {
                endpoints.insert(
                    endpoint.tag_name().name().to_ascii_lowercase(),
                    OAuthEndpoint {
                        url: required_attr(endpoint, "url")?.to_string(),
                        method: endpoint.attribute("method").unwrap_or("POST").to_ascii_uppercase(),
                        param_location: endpoint
                            .attribute("param_location")
                            .unwrap_or("auth-header")
                            .to_string(),
                    },
                );
            }
            Ok(OAuthService {
                name: service.attribute("name").unwrap_or_default().to_string(),
                version,
                scope: service.attribute("scope").map(ToString::to_string),
                endpoints,
            })
        })
        .collect()
}

fn parse_user_pref(node: Node<'_, '_>) -> Result<UserPref> {
    let name = required_attr(node, "name")?;
    let datatype = match node.attribute("datatype") {
        Some(value) => value.parse::<DataType>()?,
        None => DataType::String,
    };

    let enum_values = children(node, "EnumValue")
        .map(|value| -> Result<EnumValue> {
            let v = required_attr(value, "value")?;
            Ok(EnumValue {
                value: v.to_string(),
                display_value: value.attribute("display_value").unwrap_or(v).to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(UserPref {
        name: name.to_string(),
        display_name: node.attribute("display_name").unwrap_or(name).to_string(),
        default_value: node.attribute("default_value").unwrap_or_default().to_string(),
        required: bool_attr(node, "required", false)?,
        datatype,
        enum_values,
    })
}

fn parse_content(node: Node<'_, '_>, base: &UriResolver<'_>) -> Result<Vec<View>> {
    let content_type = match node.attribute("type") {
        Some(value) => value.parse::<ContentType>()?,
        None => ContentType::Html,
    };
    let href = node.attribute("href").map(|href| base.resolve(href)).transpose()?;
    if content_type == ContentType::Url && href.is_none() {
        return Err(GadgetError::MissingAttribute {
            element: "Content".to_string(),
            attribute: "href".to_string(),
        }
        .into());
    }

    let template = View {
        name: String::new(),
        content_type,
        content: element_text(&node),
        href,
        preferred_height: u32_attr(node, "preferred_height")?,
        preferred_width: u32_attr(node, "preferred_width")?,
    };

    let mut names = node.attribute("view").map(comma_list).unwrap_or_default();
    if names.is_empty() {
        names.push(DEFAULT_VIEW.to_string());
    }
    Ok(names
        .into_iter()
        .map(|name| View {
            name,
            ..template.clone()
        })
        .collect())
}
