//! gadgetc entry point
//!
//! Parses the command line, runs the selected command and turns failures
//! into a colored message plus a non-zero exit status.
//!
//! Commands:
//! - `render` - Render a gadget through the gadget pipeline
//! - `metadata` - Print gadget metadata as JSON
//! - `resolve` - Show the dependency order of a feature
//! - `env` - Print a container's environment-init script
//! - `js` - Print the gadget-side JavaScript of a feature

use anyhow::Result;
use clap::Parser;
use gadget_container::cli;
use gadget_container::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
