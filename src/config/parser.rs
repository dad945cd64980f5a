//! Generic configuration parsing utilities.
//!
//! Reads a TOML file and deserializes it into any `DeserializeOwned` type,
//! attaching the file path to every error so a misconfigured deployment
//! points straight at the offending file.
//!
//! Example error output:
//! ```text
//! Failed to parse config file: /etc/gadgetc/server.toml
//! Caused by:
//!     invalid type: string "x", expected u64 for key `server.request_timeout_secs`
//! ```

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a TOML configuration file into the specified type.
///
/// # Examples
///
/// ```rust,no_run
/// use gadget_container::config::parse_config;
/// use serde::Deserialize;
/// use std::path::Path;
///
/// #[derive(Deserialize)]
/// struct Config {
///     name: String,
/// }
///
/// # fn example() -> anyhow::Result<()> {
/// let config: Config = parse_config(Path::new("server.toml"))?;
/// println!("Loaded {}", config.name);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error when the file cannot be read or its content does not
/// match the shape of `T`. The underlying I/O or TOML error is kept as the
/// cause.
pub fn parse_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}
