use gadget_container::cache::CacheRegistry;
use gadget_container::config::ServerSettings;
use gadget_container::container::{Container, ContainerRegistry};
use gadget_container::core::{GadgetError, find_gadget_error};
use gadget_container::fetch::HttpFetcher;
use gadget_container::gadget::{GadgetContext, RenderMode};
use gadget_container::handler::RequestHandler;
use gadget_container::test_utils::{FeatureFixture, MockFetcher};
use std::sync::Arc;

use crate::common::{GADGET_URL, TestEnv, container_config, gadget_xml, standard_features};

/// Handler over the registry in `fixture`, serving `manifest` at [`GADGET_URL`].
fn handler_over(fixture: &FeatureFixture, manifest: &str) -> RequestHandler {
    let mut registry = ContainerRegistry::new();
    registry.insert(Container::from_config(&container_config(fixture, "default")).unwrap());
    let fetcher: Arc<dyn HttpFetcher> = Arc::new(MockFetcher::new().with_response(GADGET_URL, manifest));
    RequestHandler::new(Arc::new(registry), Arc::new(CacheRegistry::new()), fetcher, ServerSettings::default())
        .unwrap()
}

fn names(container: &Container, feature: &str) -> Vec<String> {
    container.resolve_dependencies(feature).unwrap().iter().map(|f| f.name.clone()).collect()
}

/// Test dependency-first resolution over a registry loaded from disk
#[test]
fn test_resolution_order() {
    let fixture = standard_features();
    let container = Container::from_config(&container_config(&fixture, "default")).unwrap();

    assert_eq!(names(&container, "core"), vec!["core"]);
    assert_eq!(names(&container, "settitle"), vec!["core", "rpc", "settitle"]);
    assert_eq!(names(&container, "dynamic-height"), vec!["core", "rpc", "dynamic-height"]);
    assert!(container.supports("views"));
    assert!(!container.supports("opensocial"));
}

/// Test that repeated resolution returns the same cached list
#[test]
fn test_resolution_is_cached() {
    let fixture = standard_features();
    let container = Container::from_config(&container_config(&fixture, "default")).unwrap();

    let first = container.resolve_dependencies("settitle").unwrap();
    let second = container.resolve_dependencies("settitle").unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

/// Test that unknown features are reported with their container
#[test]
fn test_unknown_feature() {
    let fixture = standard_features();
    let container = Container::from_config(&container_config(&fixture, "default")).unwrap();

    let error = container.resolve_dependencies("opensocial").unwrap_err();
    assert!(matches!(find_gadget_error(&error), Some(GadgetError::FeatureNotFound { .. })));
    assert_eq!(find_gadget_error(&error).map(GadgetError::status_code), Some(422));
}

/// Test that a dependency cycle is rejected when the container loads
#[test]
fn test_cycle_rejected_at_load() {
    let fixture = FeatureFixture::new()
        .file("container.json", "{}")
        .feature("core", &[], "")
        .feature("a", &["b"], "")
        .feature("b", &["a"], "");
    let error = Container::from_config(&container_config(&fixture, "cyclic")).err().unwrap();
    assert!(
        matches!(find_gadget_error(&error), Some(GadgetError::CircularDependency { .. })),
        "{error:#}"
    );
}

/// Test that a dependency on an undeclared feature is rejected at load
#[test]
fn test_unknown_dependency_rejected_at_load() {
    let fixture = FeatureFixture::new().file("container.json", "{}").feature("core", &["ghost"], "");
    let error = Container::from_config(&container_config(&fixture, "broken")).err().unwrap();
    assert!(
        matches!(find_gadget_error(&error), Some(GadgetError::UnknownDependency { .. })),
        "{error:#}"
    );
}

/// Test that nested index files are followed
#[test]
fn test_nested_index() {
    let fixture = FeatureFixture::new()
        .file("container.json", "{}")
        .feature("core", &[], "<gadget><script>core();</script></gadget>")
        .file("extra/tabs/feature.xml", "<feature><name>tabs</name><dependency>core</dependency></feature>")
        .file("extra/features.txt", "# extra features\ntabs/feature.xml\n");
    let index = fixture.index();
    let existing = std::fs::read_to_string(&index).unwrap();
    std::fs::write(&index, format!("{existing}\nextra/features.txt\n")).unwrap();

    let mut config = container_config(&fixture, "nested");
    config.features = vec![index];
    let container = Container::from_config(&config).unwrap();
    assert_eq!(names(&container, "tabs"), vec!["core", "tabs"]);
}

/// Test the container environment-init script
#[tokio::test]
async fn test_environment_init() {
    let env = TestEnv::new(MockFetcher::new());
    let script = env.handler.environment_init("default").await.unwrap();
    assert_eq!(
        script,
        "gadgets.rpc.container();\n\
         gadgets.config.init({\"core.io\":{\"proxyUrl\":\"/proxy\"},\"rpc\":{\"relay\":\"/rpc_relay.html\"}});\n"
    );
}

/// Test gadget-side feature JavaScript, dependencies first
#[tokio::test]
async fn test_feature_js() {
    let env = TestEnv::new(MockFetcher::new());

    let js = env.handler.feature_js("default", "settitle").await.unwrap();
    assert_eq!(
        js,
        "var gadgets = gadgets || {};\ngadgets.rpc = {};\ngadgets.window.setTitle = function() {};\n"
    );

    // Remote scripts cannot be served and are left out.
    let js = env.handler.feature_js("default", "dynamic-height").await.unwrap();
    assert_eq!(js, "var gadgets = gadgets || {};\ngadgets.rpc = {};\n");

    let error = env.handler.feature_js("default", "opensocial").await.unwrap_err();
    assert!(matches!(find_gadget_error(&error), Some(GadgetError::FeatureNotFound { .. })));
}

/// Test the per-feature file that rendered pages reference
#[tokio::test]
async fn test_served_script() {
    let env = TestEnv::new(MockFetcher::new());

    assert_eq!(env.handler.served_script("default", "rpc.js").await.unwrap(), "gadgets.rpc = {};\n");
    assert_eq!(
        env.handler.served_script("default", "settitle.js").await.unwrap(),
        "gadgets.window.setTitle = function() {};\n"
    );
    // Inline and unresolved scripts are not part of the served file.
    assert_eq!(env.handler.served_script("default", "views.js").await.unwrap(), "");

    for file in ["rpc", "opensocial.js"] {
        let error = env.handler.served_script("default", file).await.unwrap_err();
        assert!(matches!(find_gadget_error(&error), Some(GadgetError::FeatureNotFound { .. })), "{file}");
    }
}

/// Test that a feature with several file-backed scripts is referenced once
#[tokio::test]
async fn test_multi_file_feature_is_one_url() {
    let fixture = FeatureFixture::new()
        .file("container.json", "{}")
        .file("tabs/a.js", "a();")
        .file("tabs/b.js", "b();")
        .feature("core", &[], "<gadget><script>core();</script></gadget>")
        .feature("tabs", &["core"], r#"<gadget><script src="a.js"/><script src="b.js"/></gadget>"#);
    let manifest = gadget_xml("Tabs", r#"<Require feature="tabs"/>"#, "<Content>t</Content>");
    let handler = handler_over(&fixture, &manifest);

    let html = handler.create(GadgetContext::new("default", GADGET_URL)).await.unwrap();
    assert_eq!(html.matches("%2Fgadgets%2Fjs%2Ftabs.js").count(), 1, "{html}");
    assert_eq!(handler.served_script("default", "tabs.js").await.unwrap(), "a();\nb();\n");
}

/// Test that preference tokens in feature scripts are left alone in both modes
#[tokio::test]
async fn test_user_prefs_only_touch_gadget_content() {
    let fixture = FeatureFixture::new()
        .file("container.json", "{}")
        .feature("core", &[], "<gadget><script>var c = '__UP_color__';</script></gadget>");
    let manifest = gadget_xml(
        "Prefs",
        "",
        r#"<UserPref name="color" default_value="blue"/><Content>__UP_color__</Content>"#,
    );
    let handler = handler_over(&fixture, &manifest);

    for mode in [RenderMode::Iframe, RenderMode::Inline] {
        let html = handler.create(GadgetContext::new("default", GADGET_URL).with_mode(mode)).await.unwrap();
        assert!(html.contains("<script>var c = '__UP_color__';</script>"), "{html}");
        assert!(html.contains("blue"), "{html}");
        assert!(!html.contains("var c = 'blue'"), "{html}");
    }
}
