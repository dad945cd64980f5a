use anyhow::Result;
use futures::future::BoxFuture;
use gadget_container::cache::CacheRegistry;
use gadget_container::config::ServerSettings;
use gadget_container::container::Container;
use gadget_container::core::{GadgetError, find_gadget_error};
use gadget_container::document::{MutableDocument, content_node};
use gadget_container::features::{FeatureDefinition, FeatureSet, ScriptDefinition, TargetType};
use gadget_container::fetch::RequestDeadline;
use gadget_container::gadget::{Gadget, GadgetContext, GadgetParser};
use gadget_container::render::{
    ConcatModule, FeatureModule, GadgetPipeline, GadgetRenderModule, MessageModule, PipelineState, RenderContext,
    RenderStage, UserPreferencesModule, UtilModule,
};
use gadget_container::test_utils::MockFetcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const URI: &str = "http://gadgets.example.com/static.xml";

/// View stage that ignores the manifest and writes fixed markup.
struct StaticView(&'static str);

impl GadgetRenderModule for StaticView {
    fn stage(&self) -> RenderStage {
        RenderStage::View
    }

    fn render<'a>(
        &'a self,
        context: &'a RenderContext<'a>,
        document: &'a mut dyn MutableDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let node = content_node(&*document, context.gadget.context.mode)?;
            let markup = document.create_markup(self.0);
            document.append_child(node, markup);
            Ok(())
        })
    }
}

fn custom_pipeline(view: Box<dyn GadgetRenderModule>) -> Result<GadgetPipeline> {
    let settings = ServerSettings::default();
    GadgetPipeline::new(vec![
        view,
        Box::new(FeatureModule::new(&settings.js_endpoint)),
        Box::new(UserPreferencesModule::new()?),
        Box::new(MessageModule::new()?),
        Box::new(UtilModule::new()),
        Box::new(ConcatModule::new(&settings.concat_endpoint)),
    ])
}

fn container() -> Container {
    let set = FeatureSet::from_features(vec![FeatureDefinition::new("core", Vec::new()).with_script(
        TargetType::Gadget,
        ScriptDefinition::Inline {
            content: "core();".to_string(),
        },
    )]);
    Container::new("default", vec![set], &["core".to_string()], json!({})).unwrap()
}

/// Test that a replacement stage module plugs into the standard pipeline
#[tokio::test]
async fn test_custom_view_module() {
    let pipeline = custom_pipeline(Box::new(StaticView("<i>__UP_name__</i>"))).unwrap();
    let definition = GadgetParser
        .parse(r#"<Module><ModulePrefs title="S"/><UserPref name="name" default_value="World"/></Module>"#, URI)
        .unwrap();
    let gadget = Gadget::new(Arc::new(definition), GadgetContext::new("default", URI));
    let container = container();
    let fetcher = MockFetcher::new();
    let caches = CacheRegistry::new();
    let context = RenderContext {
        gadget: &gadget,
        container: &container,
        fetcher: &fetcher,
        caches: &caches,
        deadline: RequestDeadline::after(Duration::from_secs(5)),
    };

    let mut output = Vec::new();
    let state = pipeline.render(&context, &mut output).await.unwrap();
    assert_eq!(state, PipelineState::Flushed);

    let html = String::from_utf8(output).unwrap();
    assert!(html.starts_with("<html><head><script>core();</script>"), "{html}");
    assert!(html.contains("<i>World</i>"), "{html}");
    assert_eq!(fetcher.total_calls(), 0);
}

/// Test that a pipeline with stages out of order is rejected
#[test]
fn test_out_of_order_stages_rejected() {
    let settings = ServerSettings::default();
    let error = GadgetPipeline::new(vec![
        Box::new(FeatureModule::new(&settings.js_endpoint)),
        Box::new(StaticView("")),
    ])
    .err()
    .unwrap();
    assert!(matches!(find_gadget_error(&error), Some(GadgetError::PipelineOrder { .. })));

    let error = GadgetPipeline::new(vec![Box::new(StaticView(""))]).err().unwrap();
    assert!(error.to_string().contains("feature"), "{error}");
}

/// Test the state machine that guards stage order
#[test]
fn test_state_transitions() {
    let mut state = PipelineState::Created;
    for stage in RenderStage::ORDER {
        assert_eq!(state.next_stage(), Some(stage));
        state = state.advance(stage).unwrap();
    }
    assert_eq!(state, PipelineState::Concatenated);
    assert!(state.advance(RenderStage::View).is_err());
    assert_eq!(state.flush().unwrap(), PipelineState::Flushed);

    assert!(PipelineState::Created.advance(RenderStage::Feature).is_err());
    assert!(PipelineState::Localized.flush().is_err());
}
