//! Helpers shared by the CLI commands.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::GadgetError;
use crate::gadget::{BasicSecurityToken, GadgetContext, RenderMode};
use crate::handler::RequestHandler;

/// Load the configuration at `path` and build a handler for it.
///
/// # Errors
///
/// Fails when the configuration cannot be read or validated, or when a
/// container cannot be loaded.
pub fn load_handler(path: &Path) -> Result<RequestHandler> {
    debug!("Loading configuration from {}", path.display());
    let config = ServerConfig::load(path)?;
    RequestHandler::from_config(&config)
        .with_context(|| format!("Failed to initialize containers from {}", path.display()))
}

/// Split a `name=value` preference argument.
///
/// # Errors
///
/// Returns [`GadgetError::InvalidAttribute`] when there is no `=` or the
/// name is empty.
pub fn parse_pref(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(GadgetError::InvalidAttribute {
            element: "--pref".to_string(),
            attribute: "name=value".to_string(),
            value: raw.to_string(),
        }
        .into()),
    }
}

/// `--mode` values.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ModeArg {
    /// Complete HTML document
    #[default]
    Iframe,
    /// Single wrapper element
    Inline,
}

impl From<ModeArg> for RenderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Iframe => Self::Iframe,
            ModeArg::Inline => Self::Inline,
        }
    }
}

/// Request context flags shared by `render` and `metadata`.
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    /// Container to render in
    #[arg(long, default_value = "default")]
    pub container: String,

    /// View to render
    #[arg(long, default_value = crate::constants::DEFAULT_VIEW)]
    pub view: String,

    /// Request language
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Request country
    #[arg(long, default_value = "US")]
    pub country: String,

    /// Render mode
    #[arg(long, value_enum, default_value_t = ModeArg::Iframe)]
    pub mode: ModeArg,

    /// User preference override as name=value (repeatable)
    #[arg(long = "pref", value_name = "NAME=VALUE")]
    pub prefs: Vec<String>,

    /// Owner id carried by the security token
    #[arg(long, default_value = "")]
    pub owner: String,

    /// Viewer id carried by the security token
    #[arg(long, default_value = "")]
    pub viewer: String,
}

impl ContextArgs {
    /// Request context for `url`.
    ///
    /// # Errors
    ///
    /// Fails for a malformed `--pref`.
    pub fn to_context(&self, url: &str) -> Result<GadgetContext> {
        let mut context = GadgetContext::new(self.container.as_str(), url)
            .with_view(self.view.as_str())
            .with_locale(self.lang.as_str(), self.country.as_str())
            .with_mode(self.mode.into())
            .with_token(Arc::new(BasicSecurityToken::new(self.owner.as_str(), self.viewer.as_str())));
        for raw in &self.prefs {
            let (name, value) = parse_pref(raw)?;
            context = context.with_user_pref(name, value);
        }
        Ok(context)
    }
}
