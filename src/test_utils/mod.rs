//! Test utilities for the gadget container
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests under `tests/`.
//!
//! - [`init_test_logging`] installs a test-friendly tracing subscriber once
//! - [`MockFetcher`] is an in-memory [`HttpFetcher`] with call counting,
//!   per-URL delays and transport failures
//! - [`FeatureFixture`] writes a feature set (index + manifests) to disk

use anyhow::Result;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::GadgetError;
use crate::fetch::{FetchRequest, FetchResponse, HttpFetcher};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG` when it is set; with
/// neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

#[derive(Debug, Clone)]
enum MockReply {
    Response(FetchResponse),
    Failure(String),
}

#[derive(Debug, Clone)]
struct MockEntry {
    reply: MockReply,
    delay: Option<Duration>,
}

/// In-memory [`HttpFetcher`].
///
/// Unknown URLs answer `404`. Every call is counted per URL.
#[derive(Debug, Default)]
pub struct MockFetcher {
    entries: DashMap<String, MockEntry>,
    calls: DashMap<String, usize>,
    total: AtomicUsize,
}

impl MockFetcher {
    /// Create a fetcher with no configured URLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `200` and `body`.
    #[must_use]
    pub fn with_response(self, url: &str, body: &str) -> Self {
        self.with_status(url, 200, body)
    }

    /// Answer `url` with `status` and `body`.
    #[must_use]
    pub fn with_status(self, url: &str, status: u16, body: &str) -> Self {
        self.entries.insert(
            url.to_string(),
            MockEntry {
                reply: MockReply::Response(FetchResponse {
                    status,
                    body: body.to_string(),
                }),
                delay: None,
            },
        );
        self
    }

    /// Fail `url` with a transport error.
    #[must_use]
    pub fn with_failure(self, url: &str, reason: &str) -> Self {
        self.entries.insert(
            url.to_string(),
            MockEntry {
                reply: MockReply::Failure(reason.to_string()),
                delay: None,
            },
        );
        self
    }

    /// Delay the reply for `url` (which must already be configured).
    #[must_use]
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        if let Some(mut entry) = self.entries.get_mut(url) {
            entry.delay = Some(delay);
        }
        self
    }

    /// Number of fetches of `url` so far.
    pub fn calls(&self, url: &str) -> usize {
        self.calls.get(url).map_or(0, |count| *count)
    }

    /// Number of fetches of any URL so far.
    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl HttpFetcher for MockFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>> {
        Box::pin(async move {
            *self.calls.entry(request.url.clone()).or_insert(0) += 1;
            self.total.fetch_add(1, Ordering::SeqCst);

            let entry = self.entries.get(&request.url).map(|entry| entry.value().clone());
            let Some(entry) = entry else {
                return Ok(FetchResponse {
                    status: 404,
                    body: String::new(),
                });
            };

            if let Some(delay) = entry.delay {
                tokio::time::sleep(delay).await;
            }

            match entry.reply {
                MockReply::Response(response) => Ok(response),
                MockReply::Failure(reason) => Err(GadgetError::FetchFailed {
                    url: request.url.clone(),
                    reason,
                }
                .into()),
            }
        })
    }
}

/// A feature set written to a temporary directory.
pub struct FeatureFixture {
    dir: tempfile::TempDir,
    entries: Vec<String>,
}

impl FeatureFixture {
    /// Create an empty fixture.
    ///
    /// # Panics
    ///
    /// Panics when a temporary directory cannot be created.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
            entries: Vec::new(),
        }
    }

    /// Add a feature manifest at `<name>/feature.xml` with raw `body` XML
    /// placed inside `<feature>` after the generated `<name>` and
    /// `<dependency>` elements.
    ///
    /// # Panics
    ///
    /// Panics when the manifest cannot be written.
    #[must_use]
    pub fn feature(mut self, name: &str, dependencies: &[&str], body: &str) -> Self {
        let dir = self.dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("failed to create feature dir");
        let deps: String =
            dependencies.iter().map(|d| format!("<dependency>{d}</dependency>")).collect();
        std::fs::write(
            dir.join("feature.xml"),
            format!("<feature><name>{name}</name>{deps}{body}</feature>"),
        )
        .expect("failed to write feature manifest");
        self.entries.push(format!("{name}/feature.xml"));
        self
    }

    /// Write an extra file relative to the fixture root.
    ///
    /// # Panics
    ///
    /// Panics when the file cannot be written.
    #[must_use]
    pub fn file(self, relative: &str, content: &str) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create dir");
        }
        std::fs::write(path, content).expect("failed to write file");
        self
    }

    /// Write `features.txt` and return its path.
    ///
    /// # Panics
    ///
    /// Panics when the index cannot be written.
    pub fn index(&self) -> PathBuf {
        let index = self.dir.path().join("features.txt");
        std::fs::write(&index, self.entries.join("\n")).expect("failed to write index");
        index
    }

    /// Fixture root directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for FeatureFixture {
    fn default() -> Self {
        Self::new()
    }
}
