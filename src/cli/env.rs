//! Container-level script output: environment init and feature JS.

use anyhow::Result;
use clap::Args;
use std::path::Path;

use super::common::load_handler;
use crate::constants::SERVED_SCRIPT_SUFFIX;

#[derive(Args)]
pub struct EnvCommand {
    /// Container to describe
    #[arg(long, default_value = "default")]
    container: String,
}

impl EnvCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let handler = load_handler(config_path)?;
        print!("{}", handler.environment_init(&self.container).await?);
        Ok(())
    }
}

#[derive(Args)]
pub struct JsCommand {
    /// Feature whose script to print, with its dependencies; `<feature>.js`
    /// prints the file rendered pages reference instead
    feature: String,

    /// Container whose feature registry is used
    #[arg(long, default_value = "default")]
    container: String,
}

impl JsCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let handler = load_handler(config_path)?;
        let script = if self.feature.ends_with(SERVED_SCRIPT_SUFFIX) {
            handler.served_script(&self.container, &self.feature).await?
        } else {
            handler.feature_js(&self.container, &self.feature).await?
        };
        print!("{script}");
        Ok(())
    }
}
