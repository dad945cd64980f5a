use gadget_container::config::ServerSettings;
use gadget_container::gadget::GadgetContext;
use gadget_container::test_utils::MockFetcher;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{GADGET_URL, TestEnv, gadget_xml, hello_gadget};

const OTHER_URL: &str = "http://gadgets.example.com/other.xml";

fn context() -> GadgetContext {
    GadgetContext::new("default", GADGET_URL)
}

/// Test that a definition is fetched and parsed once for many requests
#[tokio::test]
async fn test_definition_cached_across_requests() {
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()));

    let first = env.handler.create(context()).await.unwrap();
    let second = env.handler.create(context().with_view("canvas")).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(env.fetcher.calls(GADGET_URL), 1);

    let a = env.handler.definitions().get(GADGET_URL).unwrap();
    let b = env.handler.definitions().get(GADGET_URL).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

/// Test that concurrent renders of one gadget all succeed and share a definition
#[tokio::test]
async fn test_concurrent_renders() {
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()));

    let renders = (0..8).map(|i| env.handler.create(context().with_user_pref("color", format!("c{i}"))));
    let results = futures::future::join_all(renders).await;
    for (i, result) in results.into_iter().enumerate() {
        assert!(result.unwrap().contains(&format!(r#"<p id="m0">c{i} Hello"#)));
    }
    assert_eq!(env.handler.caches().definitions().len(), 1);
}

/// Test that an unsupported feature yields a 422 payload
#[tokio::test]
async fn test_unsupported_feature() {
    let manifest = gadget_xml("Needs more", r#"<Require feature="opensocial-0.8"/>"#, "<Content>x</Content>");
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &manifest));

    let error = env.handler.handle_create(context()).await.unwrap_err();
    assert_eq!(error.code, 422);
    assert!(error.message.contains("opensocial-0.8"), "{}", error.message);
}

/// Test that a missing optional feature is also fatal
#[tokio::test]
async fn test_unsupported_optional_feature() {
    let manifest = gadget_xml("Optional", r#"<Optional feature="pubsub"/>"#, "<Content>x</Content>");
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &manifest));
    assert_eq!(env.handler.handle_create(context()).await.unwrap_err().code, 422);
}

/// Test that a slow manifest fetch ends the request with a 504 payload
#[tokio::test]
async fn test_timeout() {
    let settings = ServerSettings {
        request_timeout_secs: 1,
        ..ServerSettings::default()
    };
    let fetcher = MockFetcher::new()
        .with_response(GADGET_URL, &hello_gadget())
        .with_delay(GADGET_URL, Duration::from_secs(5));
    let env = TestEnv::with_settings(fetcher, settings);

    let error = env.handler.handle_create(context()).await.unwrap_err();
    assert_eq!(error.code, 504);
    assert!(env.handler.definitions().get(GADGET_URL).is_none());
}

/// Test status codes for fetch and parse failures
#[tokio::test]
async fn test_manifest_failures() {
    let env = TestEnv::new(
        MockFetcher::new()
            .with_response(OTHER_URL, "<Module><Content>no prefs</Content></Module>")
            .with_response("http://gadgets.example.com/empty.xml", "   ")
            .with_failure("http://gadgets.example.com/down.xml", "connection refused"),
    );
    let code = |url: &'static str| {
        let handler = &env.handler;
        async move { handler.handle_create(GadgetContext::new("default", url)).await.unwrap_err().code }
    };

    assert_eq!(code(GADGET_URL).await, 502);
    assert_eq!(code(OTHER_URL).await, 400);
    assert_eq!(code("http://gadgets.example.com/empty.xml").await, 400);
    assert_eq!(code("http://gadgets.example.com/down.xml").await, 502);

    // Transport failures are retried, HTTP statuses are not.
    assert_eq!(env.fetcher.calls("http://gadgets.example.com/down.xml"), 3);
    assert_eq!(env.fetcher.calls(GADGET_URL), 1);
}

/// Test that an unknown container yields a 404 payload
#[tokio::test]
async fn test_unknown_container() {
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()));
    let error = env.handler.handle_create(GadgetContext::new("intranet", GADGET_URL)).await.unwrap_err();
    assert_eq!(error.code, 404);
    assert_eq!(env.fetcher.total_calls(), 0);
}

/// Test gadget metadata, including a failing entry
#[tokio::test]
async fn test_metadata() {
    let env = TestEnv::new(MockFetcher::new().with_response(GADGET_URL, &hello_gadget()));
    let base = GadgetContext::new("default", "").with_view("canvas").with_user_pref("color", "red");

    let metadata = env.handler.metadata(&base, &[GADGET_URL.to_string(), OTHER_URL.to_string()]).await.unwrap();
    let gadgets = metadata["gadgets"].as_array().unwrap();
    assert_eq!(gadgets.len(), 2);

    let hello = &gadgets[0];
    assert_eq!(hello["url"], GADGET_URL);
    assert_eq!(hello["title"], "Hello __MSG_greeting__");
    assert_eq!(hello["author"], "Jane");
    assert_eq!(hello["height"], 200);
    assert_eq!(hello["width"], 0);
    assert_eq!(hello["features"], serde_json::json!(["dynamic-height"]));
    assert_eq!(hello["unsupportedFeatures"], serde_json::json!([]));
    assert_eq!(hello["views"]["canvas"]["type"], "html");
    assert_eq!(hello["userPrefs"]["size"]["type"], "enum");
    assert_eq!(
        hello["userPrefs"]["size"]["orderedEnumValues"],
        serde_json::json!([{"value": "s", "displayValue": "Small"}, {"value": "m", "displayValue": "m"}])
    );

    let iframe_url = hello["iframeUrl"].as_str().unwrap();
    assert!(iframe_url.starts_with("/gadgets/ifr?container=default&mid=0&lang=en&country=US&view=canvas&url="));
    assert!(iframe_url.contains("url=http%3A%2F%2Fgadgets.example.com%2Fhello.xml"));
    assert!(iframe_url.ends_with("&up_color=red&up_size=m"), "{iframe_url}");

    let other = &gadgets[1];
    assert_eq!(other["url"], OTHER_URL);
    assert_eq!(other["error"]["code"], 502);
}

/// Test that metadata for an unknown container fails as a whole
#[tokio::test]
async fn test_metadata_unknown_container() {
    let env = TestEnv::new(MockFetcher::new());
    let base = GadgetContext::new("intranet", "");
    assert!(env.handler.metadata(&base, &[GADGET_URL.to_string()]).await.is_err());
}
