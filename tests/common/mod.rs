//! Common test utilities and fixtures for gadget container tests
//!
//! Builds a small feature registry on disk, wires a [`RequestHandler`] to a
//! [`MockFetcher`] and provides gadget manifests exercising every stage.

// Allow dead code because these utilities are used across different test files
// and not all utilities are used in every test file
#![allow(dead_code)]

use assert_cmd::Command;
use gadget_container::cache::CacheRegistry;
use gadget_container::config::{ContainerConfig, ServerSettings};
use gadget_container::container::{Container, ContainerRegistry};
use gadget_container::fetch::HttpFetcher;
use gadget_container::handler::RequestHandler;
use gadget_container::test_utils::{FeatureFixture, MockFetcher};
use std::path::PathBuf;
use std::sync::Arc;

/// URL the standard gadget is served from.
pub const GADGET_URL: &str = "http://gadgets.example.com/hello.xml";

/// Settings file contents; only the `gadgets.features` section reaches
/// clients.
pub const SETTINGS_JSON: &str = r#"{
  "gadgets.features": {
    "core.io": { "proxyUrl": "/proxy" },
    "rpc": { "relay": "/rpc_relay.html" }
  },
  "gadgets.private": { "secret": "never sent" }
}"#;

/// Feature registry used by most tests:
///
/// ```text
/// core                      inline gadget script
/// rpc            -> core    local gadget script, inline container script
/// dynamic-height -> rpc     remote gadget script
/// settitle       -> rpc     res:// gadget script
/// views          -> core    unresolved res:// script plus inline script
/// ```
pub fn standard_features() -> FeatureFixture {
    FeatureFixture::new()
        .file("rpc/rpc.js", "gadgets.rpc = {};")
        .file("resources/settitle.js", "gadgets.window.setTitle = function() {};")
        .file("container.json", SETTINGS_JSON)
        .feature("core", &[], "<gadget><script>var gadgets = gadgets || {};</script></gadget>")
        .feature(
            "rpc",
            &["core"],
            r#"<gadget><script src="rpc.js"/></gadget><container><script>gadgets.rpc.container();</script></container>"#,
        )
        .feature("dynamic-height", &["rpc"], r#"<gadget><script src="http://cdn.example.com/dh.js"/></gadget>"#)
        .feature("settitle", &["rpc"], r#"<gadget><script src="res://settitle.js"/></gadget>"#)
        .feature(
            "views",
            &["core"],
            r#"<gadget><script src="res://missing/views.js"/><script>gadgets.views = {};</script></gadget>"#,
        )
}

/// Container configuration over `fixture`, with `core` as core feature.
pub fn container_config(fixture: &FeatureFixture, name: &str) -> ContainerConfig {
    ContainerConfig {
        name: name.to_string(),
        features: vec![fixture.index()],
        resource_paths: vec![fixture.root().join("resources")],
        core_features: vec!["core".to_string()],
        settings: Some(fixture.root().join("container.json")),
    }
}

/// A handler over the standard registry and a mock fetcher.
pub struct TestEnv {
    pub features: FeatureFixture,
    pub fetcher: Arc<MockFetcher>,
    pub handler: RequestHandler,
}

impl TestEnv {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self::with_settings(fetcher, ServerSettings::default())
    }

    pub fn with_settings(fetcher: MockFetcher, settings: ServerSettings) -> Self {
        let features = standard_features();
        let container = Container::from_config(&container_config(&features, "default"))
            .expect("standard container should load");
        let mut registry = ContainerRegistry::new();
        registry.insert(container);

        let fetcher = Arc::new(fetcher);
        let shared: Arc<dyn HttpFetcher> = fetcher.clone();
        let handler = RequestHandler::new(Arc::new(registry), Arc::new(CacheRegistry::new()), shared, settings)
            .expect("handler should build");
        Self {
            features,
            fetcher,
            handler,
        }
    }
}

/// Wrap `module_prefs` children and the remaining elements in a manifest.
pub fn gadget_xml(title: &str, module_prefs: &str, rest: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Module>
  <ModulePrefs title="{title}" height="200" author="Jane">{module_prefs}</ModulePrefs>
  {rest}
</Module>"#
    )
}

/// The standard gadget: one feature, one preference, English messages and
/// content touching every substitution.
pub fn hello_gadget() -> String {
    gadget_xml(
        "Hello __MSG_greeting__",
        r#"
    <Require feature="dynamic-height"><Param name="interval">50</Param></Require>
    <Locale lang="en"><msg name="greeting">Hello</msg></Locale>
    <Locale lang="fr" messages="http://gadgets.example.com/fr_ALL.xml"/>
    <Locale lang="ar" language_direction="rtl"><msg name="greeting">مرحبا</msg></Locale>"#,
        r#"
  <UserPref name="color" display_name="Color" default_value="blue"/>
  <UserPref name="size" datatype="enum" default_value="m">
    <EnumValue value="s" display_value="Small"/>
    <EnumValue value="m"/>
  </UserPref>
  <Content type="html"><![CDATA[<p id="m__MODULE_ID__">__UP_color__ __MSG_greeting__ __MSG_missingkey__ __UP_unknown__</p>]]></Content>
  <Content type="html" view="canvas"><![CDATA[<h1>Canvas __UP_size__</h1>]]></Content>"#,
    )
}

/// French message bundle served for the `fr` locale.
pub const FR_BUNDLE: &str =
    r#"<messagebundle><msg name="greeting">Bonjour</msg></messagebundle>"#;

/// A deployment directory with `gadgets.toml`, for driving the binary.
pub struct TestDeployment {
    pub features: FeatureFixture,
    pub config_path: PathBuf,
}

impl TestDeployment {
    pub fn new() -> Self {
        let features = standard_features();
        let config = format!(
            r#"[server]
request_timeout_secs = 2
fetch_retries = 0

[[containers]]
name = "default"
features = ["{index}"]
resource_paths = ["resources"]
core_features = ["core"]
settings = "container.json"
"#,
            index = features.index().file_name().and_then(|n| n.to_str()).unwrap_or("features.txt")
        );
        let features = features.file("gadgets.toml", &config);
        let config_path = features.root().join("gadgets.toml");
        Self {
            features,
            config_path,
        }
    }

    /// `gadgetc` preconfigured with this deployment's configuration.
    pub fn gadgetc(&self) -> Command {
        let mut cmd = Command::cargo_bin("gadgetc").expect("gadgetc binary should be built");
        cmd.arg("--config").arg(&self.config_path).env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestDeployment {
    fn default() -> Self {
        Self::new()
    }
}
