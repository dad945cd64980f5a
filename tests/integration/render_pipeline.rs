use gadget_container::config::ServerSettings;
use gadget_container::gadget::{BasicSecurityToken, GadgetContext, RenderMode};
use gadget_container::test_utils::MockFetcher;
use std::sync::Arc;

use crate::common::{FR_BUNDLE, GADGET_URL, TestEnv, gadget_xml, hello_gadget};

const ON_LOAD: &str = "<script>gadgets.util.runOnLoadHandlers();</script>";
const FR_BUNDLE_URL: &str = "http://gadgets.example.com/fr_ALL.xml";
const FEED_URL: &str = "http://data.example.com/feed";

fn hello_env() -> TestEnv {
    TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()))
}

fn context() -> GadgetContext {
    GadgetContext::new("default", GADGET_URL)
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack.find(needle).unwrap_or_else(|| panic!("{needle:?} not found in {haystack}"))
}

/// Test the iframe document shape and every substitution in one render
#[tokio::test]
async fn test_iframe_render() {
    let env = hello_env();
    let html = env.handler.create(context()).await.unwrap();

    assert!(html.starts_with("<html><head><script>var gadgets = gadgets || {};</script>"), "{html}");
    assert!(html.contains(r#"<p id="m0">blue Hello missingkey __UP_unknown__</p>"#), "{html}");
    assert!(html.contains(r#"<script>gadgets.Prefs.setDefaultPrefs_({"color":"blue","size":"m"});</script>"#));
    assert!(html.contains(r#"<script>gadgets.Prefs.setMessages_({"greeting":"Hello"});</script>"#));
    assert!(html.contains("<body><script>gadgets.config.init("), "{html}");
    assert!(html.ends_with(&format!("{ON_LOAD}</body></html>")), "{html}");
}

/// Test that feature scripts are batched through the concat endpoint
#[tokio::test]
async fn test_feature_scripts_are_concatenated() {
    let env = hello_env();
    let html = env.handler.create(context()).await.unwrap();

    let expected = concat!(
        r#"<script src="/gadgets/concat?rewriteMime=text%2Fjavascript&amp;"#,
        r#"gadget=http%3A%2F%2Fgadgets.example.com%2Fhello.xml&amp;"#,
        r#"1=%2Fgadgets%2Fjs%2Frpc.js&amp;2=http%3A%2F%2Fcdn.example.com%2Fdh.js"></script>"#
    );
    assert!(html.contains(expected), "{html}");
    assert!(!html.contains(r#"src="http://cdn.example.com/dh.js""#));

    // Inline core script stays ahead of the batch.
    assert!(position(&html, "var gadgets") < position(&html, "/gadgets/concat"));
}

/// Test that a custom concat endpoint from the server settings is used
#[tokio::test]
async fn test_concat_endpoint_from_settings() {
    let settings = ServerSettings {
        concat_endpoint: "/c".to_string(),
        ..ServerSettings::default()
    };
    let env = TestEnv::with_settings(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()), settings);
    let html = env.handler.create(context()).await.unwrap();
    assert!(html.contains(r#"<script src="/c?rewriteMime="#), "{html}");
}

/// Test that the init script carries settings and feature parameters
#[tokio::test]
async fn test_init_config_merges_feature_params() {
    let env = hello_env();
    let html = env.handler.create(context()).await.unwrap();

    assert!(html.contains(r#""core.io":{"proxyUrl":"/proxy"}"#), "{html}");
    assert!(html.contains(r#""core.util":{"dynamic-height":{"interval":"50"}}"#), "{html}");
    assert!(html.contains("gadgets.io.preloaded_ = [];"));
    assert!(!html.contains("never sent"));
}

/// Test the inline fragment shape
#[tokio::test]
async fn test_inline_render() {
    let env = hello_env();
    let html = env.handler.create(context().with_mode(RenderMode::Inline)).await.unwrap();

    assert!(html.starts_with("<div>"), "{html}");
    assert!(html.ends_with(&format!("{ON_LOAD}</div>")), "{html}");
    assert!(!html.contains("<html>"));
    assert!(!html.contains("<body>"));

    // Feature scripts precede the content, the init script follows it.
    let content = position(&html, r#"<p id="m0">"#);
    assert!(position(&html, "var gadgets") < content);
    assert!(position(&html, "gadgets.config.init(") > content);
}

/// Test that user preference overrides are escaped into the content
#[tokio::test]
async fn test_user_pref_override_is_escaped() {
    let env = hello_env();
    let html = env.handler.create(context().with_user_pref("color", "<b>red</b>")).await.unwrap();
    assert!(html.contains(r#"<p id="m0">&lt;b&gt;red&lt;/b&gt; Hello"#), "{html}");
}

/// Test that enum preferences default to their declared default value
#[tokio::test]
async fn test_canvas_view_uses_enum_default() {
    let env = hello_env();
    let html = env.handler.create(context().with_view("canvas")).await.unwrap();
    assert!(html.contains("<h1>Canvas m</h1>"), "{html}");
    assert!(!html.contains("<p id="));
}

/// Test that an unknown view falls back to the default view
#[tokio::test]
async fn test_unknown_view_falls_back_to_default() {
    let env = hello_env();
    let html = env.handler.create(context().with_view("profile")).await.unwrap();
    assert!(html.contains(r#"<p id="m0">"#), "{html}");
}

/// Test right-to-left locales
#[tokio::test]
async fn test_rtl_locale_sets_direction() {
    let env = hello_env();
    let html = env.handler.create(context().with_locale("ar", "EG")).await.unwrap();
    assert!(html.contains(r#"<body dir="rtl">"#), "{html}");
    assert!(html.contains("blue مرحبا missingkey"));
}

/// Test that a remote message bundle is fetched once and reused
#[tokio::test]
async fn test_remote_bundle_fetched_once() {
    let env = TestEnv::new(
        MockFetcher::new().with_response(GADGET_URL, &hello_gadget()).with_response(FR_BUNDLE_URL, FR_BUNDLE),
    );

    for _ in 0..2 {
        let html = env.handler.create(context().with_locale("fr", "FR")).await.unwrap();
        assert!(html.contains("blue Bonjour missingkey"), "{html}");
    }
    assert_eq!(env.fetcher.calls(FR_BUNDLE_URL), 1);
    assert_eq!(env.fetcher.calls(GADGET_URL), 1);
}

/// Test that a failed bundle fetch fails the render
#[tokio::test]
async fn test_missing_bundle_fails_render() {
    let env = hello_env();
    let error = env.handler.handle_create(context().with_locale("fr", "FR")).await.unwrap_err();
    assert_eq!(error.code, 502);
    assert!(error.message.contains(FR_BUNDLE_URL), "{}", error.message);
}

/// Test that without a matching locale messages stay untouched
#[tokio::test]
async fn test_no_locale_skips_localization() {
    let env = hello_env();
    let html = env.handler.create(context().with_locale("de", "DE")).await.unwrap();
    assert!(html.contains("__MSG_greeting__"), "{html}");
    assert!(!html.contains("setMessages_"));
}

/// Test remote view content, including a failing fetch
#[tokio::test]
async fn test_remote_view_content() {
    let manifest = gadget_xml(
        "Remote",
        "",
        r#"<Content href="remote.html"/><Content view="canvas" href="http://other.example.com/down.html"/>"#,
    );
    let env = TestEnv::new(
        MockFetcher::new()
            .with_response(GADGET_URL, &manifest)
            .with_response("http://gadgets.example.com/remote.html", "<em>from afar</em>")
            .with_failure("http://other.example.com/down.html", "connection reset"),
    );

    let html = env.handler.create(context()).await.unwrap();
    assert!(html.contains("<em>from afar</em>"), "{html}");

    let html = env.handler.create(context().with_view("canvas")).await.unwrap();
    assert!(html.ends_with(&format!("{ON_LOAD}</body></html>")), "{html}");
    assert!(!html.contains("from afar"));
}

/// Test that preloads are cached per viewer
#[tokio::test]
async fn test_preloads_cached_per_viewer() {
    let manifest = gadget_xml(
        "Preloads",
        &format!(r#"<Preload href="{FEED_URL}"/><Preload href="http://data.example.com/canvas" views="canvas"/>"#),
        "<Content>feed</Content>",
    );
    let env = TestEnv::new(
        MockFetcher::new()
            .with_response(GADGET_URL, &manifest)
            .with_response(FEED_URL, "[1,2]")
            .with_response("http://data.example.com/canvas", "{}"),
    );
    let as_viewer = |viewer: &str| context().with_token(Arc::new(BasicSecurityToken::new("owner", viewer)));

    let html = env.handler.create(as_viewer("alice")).await.unwrap();
    assert!(
        html.contains(r#"gadgets.io.preloaded_ = [{"id":"http://data.example.com/feed","rc":200,"body":"[1,2]"}];"#),
        "{html}"
    );
    env.handler.create(as_viewer("alice")).await.unwrap();
    assert_eq!(env.fetcher.calls(FEED_URL), 1);

    env.handler.create(as_viewer("bob")).await.unwrap();
    assert_eq!(env.fetcher.calls(FEED_URL), 2);
    assert_eq!(env.fetcher.calls("http://data.example.com/canvas"), 0);
    assert_eq!(env.handler.caches().preloads().len(), 2);
}

/// Test that a failed preload is left out of the page
#[tokio::test]
async fn test_failed_preload_is_omitted() {
    let manifest = gadget_xml("Preloads", &format!(r#"<Preload href="{FEED_URL}"/>"#), "<Content>feed</Content>");
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &manifest));

    let html = env.handler.create(context()).await.unwrap();
    assert!(html.contains("gadgets.io.preloaded_ = [];"), "{html}");
    assert!(env.handler.caches().preloads().is_empty());
}

/// Test resource scripts and unresolved resource scripts
#[tokio::test]
async fn test_resource_scripts() {
    let manifest = gadget_xml(
        "Resources",
        r#"<Require feature="settitle"/><Optional feature="views"/>"#,
        "<Content>res</Content>",
    );
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &manifest));
    let html = env.handler.create(context()).await.unwrap();

    assert!(html.contains("%2Fgadgets%2Fjs%2Fsettitle.js"), "{html}");
    assert!(html.contains("<script>gadgets.views = {};</script>"));
    assert!(!html.contains("missing"));
}

/// Test that the on-load script is the last node even with trailing content
#[tokio::test]
async fn test_on_load_script_is_last_node() {
    let manifest = gadget_xml(
        "Scripts",
        "",
        r#"<Content><![CDATA[<script src="/local/app.js"></script><div>tail</div>]]></Content>"#,
    );
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &manifest));

    for mode in [RenderMode::Iframe, RenderMode::Inline] {
        let html = env.handler.create(context().with_mode(mode)).await.unwrap();
        let close = match mode {
            RenderMode::Iframe => "</body></html>",
            RenderMode::Inline => "</div>",
        };
        assert!(html.ends_with(&format!("{ON_LOAD}{close}")), "{html}");
        assert!(html.contains(r#"<script src="/local/app.js"></script><div>tail</div>"#));
    }
}

/// Test that request-controlled values cannot close an inline script element
#[tokio::test]
async fn test_inline_script_json_cannot_break_out() {
    let manifest = gadget_xml(
        "Hostile",
        &format!(r#"<Preload href="{FEED_URL}"/><Locale><msg name="tip">a &lt;/script&gt; b</msg></Locale>"#),
        r#"<UserPref name="color" default_value="blue"/><Content>x</Content>"#,
    );
    let env = TestEnv::new(
        MockFetcher::new()
            .with_response(GADGET_URL, &manifest)
            .with_response(FEED_URL, "</script><img src=x>"),
    );
    let html = env
        .handler
        .create(context().with_user_pref("color", "</script><script>alert(1)</script>"))
        .await
        .unwrap();

    assert_eq!(html.matches("</script>").count(), html.matches("<script").count(), "{html}");
    assert!(!html.contains("alert(1)</script>"), "{html}");
    assert!(
        html.contains(r#"setDefaultPrefs_({"color":"\u003c/script\u003e\u003cscript\u003ealert(1)\u003c/script\u003e"});"#),
        "{html}"
    );
    assert!(html.contains(r#"setMessages_({"tip":"a \u003c/script\u003e b"});"#), "{html}");
    assert!(html.contains(r#""body":"\u003c/script\u003e\u003cimg src=x\u003e""#), "{html}");
}
