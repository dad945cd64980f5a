//! Show how a feature resolves in a container.
//!
//! Prints the dependency tree followed by the delivery order (dependencies
//! first, ending with the feature itself). `--format json` prints just the
//! order as an array of names.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::Path;

use super::common::load_handler;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Tree,
    Json,
}

#[derive(Args)]
pub struct ResolveCommand {
    /// Feature to resolve
    feature: String,

    /// Container whose feature registry is used
    #[arg(long, default_value = "default")]
    container: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Tree)]
    format: OutputFormat,
}

impl ResolveCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let handler = load_handler(config_path)?;
        let container = handler.containers().get(&self.container)?;
        let resolved = container.resolve_dependencies(&self.feature)?;
        let order: Vec<&str> = resolved.iter().map(|f| f.name.as_str()).collect();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&order)?),
            OutputFormat::Tree => {
                println!("{} {}", container.name().cyan().bold(), self.feature.bold());
                if let Some(tree) = container.graph().to_tree_string(&self.feature) {
                    print!("{tree}");
                }
                println!();
                println!("{}", "Delivery order:".green());
                for (index, name) in order.iter().enumerate() {
                    println!("  {:>2}. {}", index + 1, name);
                }
            }
        }
        Ok(())
    }
}
