//! Print gadget metadata as pretty JSON.

use anyhow::Result;
use clap::Args;
use std::path::Path;

use super::common::{ContextArgs, load_handler};

#[derive(Args)]
pub struct MetadataCommand {
    /// URLs of the gadget manifests
    #[arg(required = true)]
    urls: Vec<String>,

    #[command(flatten)]
    context: ContextArgs,
}

impl MetadataCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let handler = load_handler(config_path)?;
        let base = self.context.to_context("")?;
        let metadata = handler.metadata(&base, &self.urls).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        Ok(())
    }
}
