//! Render pipelines.
//!
//! Two pipelines drive ordered lists of modules against a shared output:
//!
//! - [`GadgetPipeline`] renders one gadget into an [`HtmlDocument`] through
//!   six stages that must run in exactly this order:
//!   [`RenderStage::View`], [`RenderStage::Feature`],
//!   [`RenderStage::UserPreferences`], [`RenderStage::Message`],
//!   [`RenderStage::Util`], [`RenderStage::Concat`].
//! - [`ContainerPipeline`] renders the container environment script into a
//!   string buffer.
//!
//! Stages run one after another; each may fan out I/O internally but
//! finishes completely before the next one starts. The output is written to
//! the destination once, after the last stage. A stage error aborts the
//! pipeline before anything is written.
//!
//! # Modules
//!
//! - [`view`] - selected view content, fetching remote views
//! - [`feature`] - feature `<script>` injection
//! - [`user_prefs`] - `__UP_name__` substitution and default prefs
//! - [`message`] - `__MSG_key__` substitution and the message table
//! - [`util`] - preloads, `__MODULE_ID__`, config init, on-load handlers
//! - [`concat`] - batching of external scripts through the concat endpoint
//! - [`container`] - environment-init modules of the container pipeline

pub mod concat;
pub mod container;
pub mod feature;
pub mod message;
pub mod user_prefs;
pub mod util;
pub mod view;

pub use concat::ConcatModule;
pub use container::{ContainerConfigModule, ContainerFeatureModule, ContainerPipeline, ContainerRenderModule};
pub use feature::FeatureModule;
pub use message::MessageModule;
pub use user_prefs::UserPreferencesModule;
pub use util::UtilModule;
pub use view::ViewModule;

use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::cache::CacheRegistry;
use crate::config::ServerSettings;
use crate::container::Container;
use crate::core::GadgetError;
use crate::document::{HtmlDocument, MutableDocument};
use crate::fetch::{HttpFetcher, RequestDeadline};
use crate::gadget::Gadget;

/// Gadget pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderStage {
    View,
    Feature,
    UserPreferences,
    Message,
    Util,
    Concat,
}

impl RenderStage {
    /// Every stage in the order the pipeline runs them.
    pub const ORDER: [Self; 6] =
        [Self::View, Self::Feature, Self::UserPreferences, Self::Message, Self::Util, Self::Concat];

    pub const fn name(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Feature => "feature",
            Self::UserPreferences => "user-preferences",
            Self::Message => "message",
            Self::Util => "util",
            Self::Concat => "concat",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress of one gadget render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Created,
    ViewRendered,
    FeaturesInjected,
    PrefsSubstituted,
    Localized,
    UtilInjected,
    Concatenated,
    Flushed,
}

impl PipelineState {
    /// Stage that has to run next, `None` once all stages are done.
    pub const fn next_stage(self) -> Option<RenderStage> {
        match self {
            Self::Created => Some(RenderStage::View),
            Self::ViewRendered => Some(RenderStage::Feature),
            Self::FeaturesInjected => Some(RenderStage::UserPreferences),
            Self::PrefsSubstituted => Some(RenderStage::Message),
            Self::Localized => Some(RenderStage::Util),
            Self::UtilInjected => Some(RenderStage::Concat),
            Self::Concatenated | Self::Flushed => None,
        }
    }

    /// State after `stage` completes.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::PipelineOrder`] when `stage` is not the next
    /// stage.
    pub fn advance(self, stage: RenderStage) -> Result<Self> {
        if self.next_stage() != Some(stage) {
            return Err(GadgetError::PipelineOrder {
                expected: self.next_stage().map_or_else(|| "flush".to_string(), |s| s.to_string()),
                found: stage.to_string(),
            }
            .into());
        }
        Ok(match stage {
            RenderStage::View => Self::ViewRendered,
            RenderStage::Feature => Self::FeaturesInjected,
            RenderStage::UserPreferences => Self::PrefsSubstituted,
            RenderStage::Message => Self::Localized,
            RenderStage::Util => Self::UtilInjected,
            RenderStage::Concat => Self::Concatenated,
        })
    }

    /// State after the output has been written.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::PipelineOrder`] unless every stage has run.
    pub fn flush(self) -> Result<Self> {
        match self {
            Self::Concatenated => Ok(Self::Flushed),
            other => Err(GadgetError::PipelineOrder {
                expected: other.next_stage().map_or_else(|| "nothing".to_string(), |s| s.to_string()),
                found: "flush".to_string(),
            }
            .into()),
        }
    }
}

/// Read-only inputs shared by every stage of one gadget render.
pub struct RenderContext<'a> {
    pub gadget: &'a Gadget,
    pub container: &'a Container,
    pub fetcher: &'a dyn HttpFetcher,
    pub caches: &'a CacheRegistry,
    pub deadline: RequestDeadline,
}

/// One stage of the gadget pipeline.
pub trait GadgetRenderModule: Send + Sync {
    /// The stage this module implements.
    fn stage(&self) -> RenderStage;

    /// Mutate `document` for `context`.
    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>>;
}

/// The gadget render pipeline.
pub struct GadgetPipeline {
    modules: Vec<Box<dyn GadgetRenderModule>>,
}

impl GadgetPipeline {
    /// Build a pipeline from modules listed in stage order.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::PipelineOrder`] unless `modules` implement
    /// exactly the six stages in order.
    pub fn new(modules: Vec<Box<dyn GadgetRenderModule>>) -> Result<Self> {
        for (index, expected) in RenderStage::ORDER.iter().enumerate() {
            match modules.get(index) {
                Some(module) if module.stage() == *expected => {}
                Some(module) => {
                    return Err(GadgetError::PipelineOrder {
                        expected: expected.to_string(),
                        found: module.stage().to_string(),
                    }
                    .into());
                }
                None => {
                    return Err(GadgetError::PipelineOrder {
                        expected: expected.to_string(),
                        found: "end of pipeline".to_string(),
                    }
                    .into());
                }
            }
        }
        if let Some(extra) = modules.get(RenderStage::ORDER.len()) {
            return Err(GadgetError::PipelineOrder {
                expected: "end of pipeline".to_string(),
                found: extra.stage().to_string(),
            }
            .into());
        }
        Ok(Self {
            modules,
        })
    }

    /// The standard six-stage pipeline configured from `settings`.
    ///
    /// # Errors
    ///
    /// Fails only when a substitution pattern does not compile.
    pub fn standard(settings: &ServerSettings) -> Result<Self> {
        Self::new(vec![
            Box::new(ViewModule),
            Box::new(FeatureModule::new(&settings.js_endpoint)),
            Box::new(UserPreferencesModule::new()?),
            Box::new(MessageModule::new()?),
            Box::new(UtilModule::new()),
            Box::new(ConcatModule::new(&settings.concat_endpoint)),
        ])
    }

    /// Run every stage and write the document to `writer` once.
    ///
    /// # Errors
    ///
    /// Propagates the first stage error; nothing is written in that case.
    pub async fn render<W>(&self, context: &RenderContext<'_>, writer: &mut W) -> Result<PipelineState>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut document = HtmlDocument::for_mode(context.gadget.context.mode);
        let mut state = PipelineState::Created;

        for module in &self.modules {
            let stage = module.stage();
            debug!(
                "Running {} stage ({} mode) for {}",
                stage, context.gadget.context.mode, context.gadget.definition.uri
            );
            module.render(context, &mut document).await?;
            state = state.advance(stage)?;
        }

        writer.write_all(document.render().as_bytes()).await?;
        writer.flush().await?;
        state.flush()
    }

    /// Run every stage and return the rendered document.
    ///
    /// # Errors
    ///
    /// Propagates the first stage error.
    pub async fn render_to_string(&self, context: &RenderContext<'_>) -> Result<String> {
        let mut output = Vec::new();
        self.render(context, &mut output).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}
