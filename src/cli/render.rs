//! Render a single gadget.
//!
//! The rendered document goes to stdout. With `--json` a failure is printed
//! as an error payload (`{"code": ..., "message": ...}`) on stdout instead
//! of a message on stderr, mirroring what an HTTP front end would return.

use anyhow::Result;
use clap::Args;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::common::{ContextArgs, load_handler};

#[derive(Args)]
pub struct RenderCommand {
    /// URL of the gadget manifest
    url: String,

    #[command(flatten)]
    context: ContextArgs,

    /// Print failures as a JSON error payload on stdout
    #[arg(long)]
    json: bool,
}

impl RenderCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let handler = load_handler(config_path)?;
        let context = self.context.to_context(&self.url)?;

        let mut stdout = tokio::io::stdout();
        if !self.json {
            handler.create_to(context, &mut stdout).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            return Ok(());
        }

        match handler.handle_create(context).await {
            Ok(document) => println!("{document}"),
            Err(payload) => {
                println!("{}", serde_json::to_string(&payload)?);
                return Err(payload.into());
            }
        }
        Ok(())
    }
}
