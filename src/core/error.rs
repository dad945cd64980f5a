//! Error handling for the gadget container
//!
//! This module provides the error types and user-friendly error reporting used
//! across the container. The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can branch on the failure mode
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`GadgetError`] - Enumerated error types for every failure the core reports
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! Orchestration code returns [`anyhow::Result`] and carries a [`GadgetError`]
//! inside it. Callers that need the typed error (for example to build a
//! structured error payload) recover it with [`anyhow::Error::downcast_ref`].
//!
//! # Error Categories
//!
//! - **Configuration**: [`GadgetError::ContainerNotFound`], [`GadgetError::FeatureNotFound`],
//!   [`GadgetError::UnknownDependency`], [`GadgetError::CircularDependency`],
//!   [`GadgetError::ConfigError`]
//! - **Parsing**: [`GadgetError::ManifestParseError`], [`GadgetError::MissingAttribute`],
//!   [`GadgetError::InvalidAttribute`], [`GadgetError::FeatureManifestInvalid`]
//! - **Remote fetch**: [`GadgetError::FetchFailed`], [`GadgetError::HttpStatus`],
//!   [`GadgetError::Timeout`]
//! - **Programming errors**: [`GadgetError::BundleNotReady`], [`GadgetError::PipelineOrder`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use gadget_container::core::{GadgetError, user_friendly_error};
//!
//! let error = GadgetError::FeatureNotFound {
//!     feature: "opensocial-0.9".to_string(),
//!     container: "default".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for gadget container operations
///
/// Each variant names the offending item (feature, attribute, URL) so that a
/// failure can be traced back to the manifest or configuration that caused it.
#[derive(Error, Debug)]
pub enum GadgetError {
    /// No container with the requested name is configured
    #[error("Container not found: {name}")]
    ContainerNotFound {
        /// Requested container name
        name: String,
    },

    /// A gadget requires a feature the container does not provide
    #[error("Feature '{feature}' is not supported by container '{container}'")]
    FeatureNotFound {
        /// Feature named by the gadget
        feature: String,
        /// Container the gadget is rendered in
        container: String,
    },

    /// A feature declares a dependency that is not part of the registry
    #[error("Feature '{feature}' depends on unknown feature '{dependency}'")]
    UnknownDependency {
        /// Feature declaring the dependency
        feature: String,
        /// Dependency name that failed to resolve
        dependency: String,
    },

    /// Feature dependencies form a cycle
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// Cycle path, e.g. `a → b → a`
        cycle: String,
    },

    /// A feature manifest could not be read or is structurally invalid
    #[error("Invalid feature manifest {path}: {reason}")]
    FeatureManifestInvalid {
        /// Path to the feature manifest
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// A gadget manifest could not be parsed
    #[error("Failed to parse gadget manifest {uri}: {reason}")]
    ManifestParseError {
        /// Source URI of the manifest
        uri: String,
        /// Parser diagnostic
        reason: String,
    },

    /// A required attribute is absent from a manifest element
    #[error("Element <{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Element name
        element: String,
        /// Attribute name
        attribute: String,
    },

    /// An attribute value could not be interpreted
    #[error("Element <{element}> has invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        /// Element name
        element: String,
        /// Attribute name
        attribute: String,
        /// Offending value
        value: String,
    },

    /// A remote fetch failed at the transport level
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed {
        /// Requested URL
        url: String,
        /// Transport error description
        reason: String,
    },

    /// A remote fetch returned a non-success status
    #[error("Fetching {url} returned HTTP {status}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned by the remote server
        status: u16,
    },

    /// The request deadline expired while waiting on I/O
    #[error("Request deadline exceeded during {operation}")]
    Timeout {
        /// Operation that was in flight
        operation: String,
    },

    /// A message bundle was read before it was initialized
    #[error("Message bundle for locale {locale} was read before it was initialized")]
    BundleNotReady {
        /// Locale of the bundle
        locale: String,
    },

    /// The fetched gadget manifest body is empty
    #[error("Gadget {uri} returned an empty manifest")]
    NoContent {
        /// Source URI of the gadget
        uri: String,
    },

    /// Render stages were wired out of order
    #[error("Render pipeline expected stage {expected} but found {found}")]
    PipelineOrder {
        /// Stage required at this position
        expected: String,
        /// Stage actually registered
        found: String,
    },

    /// Configuration file problems
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization or parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML well-formedness error
    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    /// Generic error for cases not covered above
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl GadgetError {
    /// Short machine-readable category for this error.
    ///
    /// Logged as the `kind` field of request failures.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ContainerNotFound { .. } => "container_not_found",
            Self::FeatureNotFound { .. } => "feature_not_found",
            Self::UnknownDependency { .. } => "unknown_dependency",
            Self::CircularDependency { .. } => "circular_dependency",
            Self::FeatureManifestInvalid { .. } => "feature_manifest_invalid",
            Self::ManifestParseError { .. }
            | Self::XmlError(_) => "manifest_parse_error",
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::InvalidAttribute { .. } => "invalid_attribute",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::HttpStatus { .. } => "http_status",
            Self::Timeout { .. } => "timeout",
            Self::BundleNotReady { .. } => "bundle_not_ready",
            Self::NoContent { .. } => "no_content",
            Self::PipelineOrder { .. } => "pipeline_order",
            Self::ConfigError { .. } => "config_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
            Self::UrlError(_) => "url_error",
            Self::Other { .. } => "other",
        }
    }

    /// HTTP-style status code used when this error ends a request.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ContainerNotFound { .. } => 404,
            Self::ManifestParseError { .. }
            | Self::MissingAttribute { .. }
            | Self::InvalidAttribute { .. }
            | Self::NoContent { .. }
            | Self::XmlError(_)
            | Self::UrlError(_) => 400,
            Self::FeatureNotFound { .. }
            | Self::UnknownDependency { .. }
            | Self::CircularDependency { .. } => 422,
            Self::FetchFailed { .. }
            | Self::HttpStatus { .. } => 502,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Pairs a [`GadgetError`] with an optional suggestion (displayed in green)
/// and optional details (displayed in yellow).
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: GadgetError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: GadgetError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`GadgetError`] (anywhere in the `anyhow` chain) and
/// [`std::io::Error`]; anything else is reported with its full context chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(gadget_error) = find_gadget_error(&error) {
        return create_error_context(gadget_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let ctx = ErrorContext::new(GadgetError::Other {
            message: io_error.to_string(),
        });
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ctx
                .with_suggestion("Check that the file or directory exists and the path is correct"),
            std::io::ErrorKind::PermissionDenied => {
                ctx.with_suggestion("Check the file permissions of the configuration and feature files")
            }
            _ => ctx,
        };
    }

    ErrorContext::new(GadgetError::Other {
        message: format!("{error:#}"),
    })
}

/// Find the first [`GadgetError`] in an error's cause chain.
pub fn find_gadget_error(error: &anyhow::Error) -> Option<&GadgetError> {
    error.chain().find_map(|cause| cause.downcast_ref::<GadgetError>())
}

fn create_error_context(error: &GadgetError) -> ErrorContext {
    let base = ErrorContext::new(GadgetError::Other {
        message: error.to_string(),
    });
    match error {
        GadgetError::ContainerNotFound { .. } => base.with_suggestion("Check the [[containers]] entries in your configuration file"),
        GadgetError::FeatureNotFound { .. } => base
            .with_suggestion("Add a feature set providing this feature to the container's 'features' list")
            .with_details("Every <Require> and <Optional> feature must exist in the container registry"),
        GadgetError::UnknownDependency { .. }
        | GadgetError::CircularDependency { .. } => base.with_suggestion("Fix the <dependency> entries of the named feature manifest"),
        GadgetError::FetchFailed { .. }
        | GadgetError::HttpStatus { .. } => base.with_suggestion("Check that the URL is reachable from this host"),
        GadgetError::Timeout { .. } => base.with_suggestion("Increase [server].request_timeout_secs or check the remote host"),
        GadgetError::MissingAttribute { .. }
        | GadgetError::InvalidAttribute { .. }
        | GadgetError::ManifestParseError { .. } => base.with_details("The gadget manifest is malformed and cannot be rendered"),
        _ => base,
    }
}
