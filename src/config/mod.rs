//! Server configuration for the gadget container.
//!
//! The configuration is a TOML file read once at startup. It names the
//! containers to serve, the feature set index files each container loads,
//! the `res://` search roots, the always-injected core features and the
//! container settings file whose `gadgets.features` section is passed to
//! clients verbatim.
//!
//! # File Format
//!
//! ```toml
//! [server]
//! request_timeout_secs = 30
//! fetch_retries = 2
//!
//! [[containers]]
//! name = "default"
//! features = ["features/features.txt"]
//! resource_paths = ["resources"]
//! core_features = ["core"]
//! settings = "container.json"
//! ```
//!
//! Relative paths are resolved against the directory containing the
//! configuration file, so a deployment directory can be moved as a unit.

mod parser;

pub use parser::parse_config;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONCAT_ENDPOINT, DEFAULT_FETCH_RETRIES, DEFAULT_IFRAME_ENDPOINT, DEFAULT_JS_ENDPOINT,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::core::GadgetError;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Request handling settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Containers served by this process.
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

/// Request handling settings shared by all containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,

    /// Extra attempts for the primary manifest fetch on transport errors.
    pub fetch_retries: u32,

    /// Endpoint serving rendered gadget iframes, used to build `iframeUrl`.
    pub iframe_endpoint: String,

    /// Endpoint combining several scripts into one response.
    pub concat_endpoint: String,

    /// Endpoint serving feature JavaScript for local and resource scripts.
    pub js_endpoint: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            iframe_endpoint: DEFAULT_IFRAME_ENDPOINT.to_string(),
            concat_endpoint: DEFAULT_CONCAT_ENDPOINT.to_string(),
            js_endpoint: DEFAULT_JS_ENDPOINT.to_string(),
        }
    }
}

impl ServerSettings {
    /// The per-request deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One deployment target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Unique container name.
    pub name: String,

    /// Feature set index files, in load order.
    #[serde(default)]
    pub features: Vec<PathBuf>,

    /// Search roots for `res://` script sources, in priority order.
    #[serde(default)]
    pub resource_paths: Vec<PathBuf>,

    /// Features injected into every gadget rendered by this container.
    #[serde(default)]
    pub core_features: Vec<String>,

    /// JSON settings file; its `gadgets.features` object is sent to clients.
    #[serde(default)]
    pub settings: Option<PathBuf>,
}

impl ServerConfig {
    /// Load a configuration file and resolve its relative paths.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, when it declares no
    /// containers, or when two containers share a name.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = parse_config(path)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.resolve_paths(&base);
        config.validate()?;
        Ok(config)
    }

    /// Make every relative path in the configuration relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for container in &mut self.containers {
            for path in container.features.iter_mut().chain(container.resource_paths.iter_mut()) {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
            if let Some(settings) = &mut container.settings
                && settings.is_relative()
            {
                *settings = base.join(&*settings);
            }
        }
    }

    /// Check structural invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`GadgetError::ConfigError`] naming the problem.
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(GadgetError::ConfigError {
                message: "no [[containers]] are configured".to_string(),
            }
            .into());
        }

        let mut seen = std::collections::HashSet::new();
        for container in &self.containers {
            if !seen.insert(container.name.as_str()) {
                return Err(GadgetError::ConfigError {
                    message: format!("container '{}' is declared more than once", container.name),
                }
                .into());
            }
        }

        if self.server.request_timeout_secs == 0 {
            return Err(GadgetError::ConfigError {
                message: "server.request_timeout_secs must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
