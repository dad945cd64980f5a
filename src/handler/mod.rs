//! Request orchestration.
//!
//! [`RequestHandler`] owns everything that lives for the whole process (the
//! container registry, the caches, the fetcher and both pipelines) and
//! serves the four request kinds:
//!
//! - **environment init**: container feature scripts plus config init
//! - **create**: fetch (or reuse) a gadget definition and render it
//! - **metadata**: describe gadgets as JSON, with their iframe URLs
//! - **feature JS**: the gadget-side script of a feature and its dependencies
//! - **served script**: the `{feature}.js` file rendered pages reference
//!
//! Every request gets its own [`RequestDeadline`]. Failures surface as
//! [`ErrorPayload`] values carrying an HTTP-style code and a message, never
//! as partially rendered output.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::cache::{CacheRegistry, DefinitionFactory};
use crate::config::{ServerConfig, ServerSettings};
use crate::constants::{MODULE_ID_VALUE, SERVED_SCRIPT_SUFFIX};
use crate::container::{Container, ContainerRegistry};
use crate::core::{GadgetError, find_gadget_error};
use crate::features::{ScriptDefinition, TargetType};
use crate::fetch::{HttpFetcher, RequestDeadline, ReqwestFetcher};
use crate::gadget::{Gadget, GadgetContext, GadgetDefinition};
use crate::render::{ContainerPipeline, GadgetPipeline, PipelineState, RenderContext};
use crate::utils::query_string;

/// Structured failure of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
}

impl ErrorPayload {
    /// Payload for `error`: the status of the carried
    /// [`crate::core::GadgetError`], 500 when there is none.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            code: find_gadget_error(error).map_or(500, GadgetError::status_code),
            message: format!("{error:#}"),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorPayload {}

/// Serves gadget requests.
pub struct RequestHandler {
    containers: Arc<ContainerRegistry>,
    caches: Arc<CacheRegistry>,
    fetcher: Arc<dyn HttpFetcher>,
    factory: DefinitionFactory,
    gadget_pipeline: GadgetPipeline,
    container_pipeline: ContainerPipeline,
    settings: ServerSettings,
}

impl RequestHandler {
    /// Wire a handler from its collaborators.
    ///
    /// # Errors
    ///
    /// Fails when the standard gadget pipeline cannot be built.
    pub fn new(
        containers: Arc<ContainerRegistry>,
        caches: Arc<CacheRegistry>,
        fetcher: Arc<dyn HttpFetcher>,
        settings: ServerSettings,
    ) -> Result<Self> {
        let factory = DefinitionFactory::new(Arc::clone(&caches), Arc::clone(&fetcher), settings.fetch_retries);
        Ok(Self {
            containers,
            caches,
            fetcher,
            factory,
            gadget_pipeline: GadgetPipeline::standard(&settings)?,
            container_pipeline: ContainerPipeline::standard(),
            settings,
        })
    }

    /// Load every container named by `config` and use a `reqwest` fetcher.
    ///
    /// # Errors
    ///
    /// Fails when a container cannot be loaded or the HTTP client cannot be
    /// built.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let containers = ContainerRegistry::from_config(config)?;
        info!("Loaded containers: {}", containers.names().join(", "));
        let fetcher = ReqwestFetcher::new(config.server.request_timeout())?;
        Self::new(
            Arc::new(containers),
            Arc::new(CacheRegistry::new()),
            Arc::new(fetcher),
            config.server.clone(),
        )
    }

    pub fn containers(&self) -> &ContainerRegistry {
        &self.containers
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// The definition factory backing `create` and `metadata`.
    pub const fn definitions(&self) -> &DefinitionFactory {
        &self.factory
    }

    fn deadline(&self) -> RequestDeadline {
        RequestDeadline::after(self.settings.request_timeout())
    }

    /// Environment-init script of `container`.
    ///
    /// # Errors
    ///
    /// Fails for unknown containers and unreadable feature scripts.
    pub async fn environment_init(&self, container: &str) -> Result<String> {
        let container = self.containers.get(container)?;
        let mut output = Vec::new();
        self.container_pipeline.render(&container, &mut output).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Render the gadget described by `context` into `writer`.
    ///
    /// # Errors
    ///
    /// Fails for unknown containers, manifest fetch or parse failures,
    /// unsupported features and any fatal stage error. Nothing is written
    /// on failure.
    pub async fn create_to<W>(&self, context: GadgetContext, writer: &mut W) -> Result<PipelineState>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let container = self.containers.get(&context.container)?;
        let deadline = self.deadline();
        let definition = self.factory.fetch(&context.url, &deadline).await?;
        let gadget = Gadget::new(definition, context);

        let render_context = RenderContext {
            gadget: &gadget,
            container: &container,
            fetcher: self.fetcher.as_ref(),
            caches: &self.caches,
            deadline,
        };
        self.gadget_pipeline.render(&render_context, writer).await
    }

    /// Render the gadget described by `context`.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::create_to`].
    pub async fn create(&self, context: GadgetContext) -> Result<String> {
        let mut output = Vec::new();
        self.create_to(context, &mut output).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// [`RequestHandler::create`] with failures turned into an
    /// [`ErrorPayload`].
    pub async fn handle_create(&self, context: GadgetContext) -> Result<String, ErrorPayload> {
        let url = context.url.clone();
        self.create(context).await.map_err(|e| {
            let payload = ErrorPayload::from_error(&e);
            let kind = find_gadget_error(&e).map_or("internal", GadgetError::kind);
            warn!(kind, "Rendering {} failed: {}", url, payload);
            payload
        })
    }

    /// Metadata for each of `urls`, rendered with `base` as context.
    ///
    /// A gadget that cannot be fetched or parsed yields an entry with an
    /// `error` payload instead of failing the whole request.
    ///
    /// # Errors
    ///
    /// Fails when the container is unknown.
    pub async fn metadata(&self, base: &GadgetContext, urls: &[String]) -> Result<Value> {
        let container = self.containers.get(&base.container)?;
        let deadline = self.deadline();

        let mut gadgets = Vec::with_capacity(urls.len());
        for url in urls {
            let context = GadgetContext {
                url: url.clone(),
                ..base.clone()
            };
            match self.factory.fetch(url, &deadline).await {
                Ok(definition) => gadgets.push(self.gadget_metadata(&container, definition, context)),
                Err(e) => {
                    debug!("Metadata for {} failed: {:#}", url, e);
                    gadgets.push(json!({ "url": url, "error": ErrorPayload::from_error(&e) }));
                }
            }
        }
        Ok(json!({ "gadgets": gadgets }))
    }

    fn gadget_metadata(&self, container: &Container, definition: Arc<GadgetDefinition>, context: GadgetContext) -> Value {
        let gadget = Gadget::new(definition, context);
        let prefs = &gadget.definition.module_prefs;
        let dimension = |name: &str| prefs.attribute(name).and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0);

        let mut views = Map::new();
        for view in &gadget.definition.views {
            views.entry(view.name.clone()).or_insert_with(|| {
                json!({
                    "type": view.content_type.as_str(),
                    "preferredHeight": view.preferred_height,
                    "preferredWidth": view.preferred_width,
                })
            });
        }

        let mut user_prefs = Map::new();
        for pref in &gadget.definition.user_prefs {
            let enum_values: Vec<Value> = pref
                .enum_values
                .iter()
                .map(|v| json!({ "value": v.value, "displayValue": v.display_value }))
                .collect();
            user_prefs.insert(
                pref.name.clone(),
                json!({
                    "displayName": pref.display_name,
                    "type": pref.datatype.as_str(),
                    "default": pref.default_value,
                    "required": pref.required,
                    "orderedEnumValues": enum_values,
                }),
            );
        }

        let features: Vec<&str> = prefs.features.iter().map(|f| f.name.as_str()).collect();
        let unsupported: Vec<&str> = features.iter().copied().filter(|f| !container.supports(f)).collect();
        let links: Map<String, Value> =
            prefs.links.iter().map(|l| (l.rel.clone(), Value::String(l.href.clone()))).collect();

        json!({
            "url": gadget.context.url,
            "iframeUrl": self.iframe_url(&gadget),
            "moduleId": 0,
            "title": prefs.title(),
            "titleUrl": prefs.attribute("title_url").unwrap_or_default(),
            "description": prefs.attribute("description").unwrap_or_default(),
            "author": prefs.attribute("author").unwrap_or_default(),
            "authorEmail": prefs.attribute("author_email").unwrap_or_default(),
            "screenshot": prefs.attribute("screenshot").unwrap_or_default(),
            "thumbnail": prefs.attribute("thumbnail").unwrap_or_default(),
            "height": dimension("height"),
            "width": dimension("width"),
            "features": features,
            "unsupportedFeatures": unsupported,
            "views": views,
            "userPrefs": user_prefs,
            "links": links,
            "modulePrefs": prefs.attributes,
        })
    }

    /// URL at which the iframe endpoint renders `gadget`.
    pub fn iframe_url(&self, gadget: &Gadget) -> String {
        let context = &gadget.context;
        let user_prefs: Vec<(String, String)> =
            gadget.user_pref_values().into_iter().map(|(name, value)| (format!("up_{name}"), value)).collect();

        let pairs = [
            ("container", context.container.as_str()),
            ("mid", MODULE_ID_VALUE),
            ("lang", context.language.as_str()),
            ("country", context.country.as_str()),
            ("view", gadget.current_view_name()),
            ("url", context.url.as_str()),
        ]
        .into_iter()
        .chain(user_prefs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        format!("{}?{}", self.settings.iframe_endpoint, query_string(pairs))
    }

    /// Gadget-side script of `feature` and its dependencies, dependency
    /// first. Remote and unresolved scripts are left out.
    ///
    /// # Errors
    ///
    /// Fails for unknown containers or features and unreadable script files.
    pub async fn feature_js(&self, container: &str, feature: &str) -> Result<String> {
        let container = self.containers.get(container)?;
        let features = container.resolve_dependencies(feature)?;

        let mut output = String::new();
        for definition in features.iter() {
            for script in definition.delivered_scripts(TargetType::Gadget) {
                let content = script
                    .content()
                    .with_context(|| format!("Failed to load script of feature '{}'", definition.name))?;
                if let Some(content) = content {
                    output.push_str(&content);
                    output.push('\n');
                }
            }
        }
        Ok(output)
    }

    /// Body of `{js_endpoint}/{feature}.js`: the local and resource
    /// gadget scripts of one feature, in declaration order.
    ///
    /// # Errors
    ///
    /// Fails for unknown containers, for names without the `.js` suffix or
    /// naming no feature, and for unreadable script files.
    pub async fn served_script(&self, container: &str, file: &str) -> Result<String> {
        let container = self.containers.get(container)?;
        let name = file.strip_suffix(SERVED_SCRIPT_SUFFIX).unwrap_or(file);
        let feature = match container.feature(name) {
            Some(feature) if file.ends_with(SERVED_SCRIPT_SUFFIX) => feature,
            _ => {
                return Err(GadgetError::FeatureNotFound {
                    feature: file.to_string(),
                    container: container.name().to_string(),
                }
                .into());
            }
        };

        let mut output = String::new();
        for script in feature.delivered_scripts(TargetType::Gadget) {
            if !matches!(script, ScriptDefinition::Local { .. } | ScriptDefinition::Resource { .. }) {
                continue;
            }
            let content =
                script.content().with_context(|| format!("Failed to load script of feature '{}'", feature.name))?;
            if let Some(content) = content {
                output.push_str(&content);
                output.push('\n');
            }
        }
        Ok(output)
    }
}
