//! Gadget Container
//!
//! A server-side container for OpenSocial-style gadgets: it loads feature
//! registries, resolves feature dependencies, parses gadget manifests and
//! renders them through an asynchronous six-stage pipeline into either a
//! full iframe document or an inline fragment.
//!
//! # Architecture Overview
//!
//! Everything long-lived is built once at startup from a TOML
//! configuration:
//! - each [`container::Container`] owns an immutable feature registry and
//!   its dependency graph, with cycles rejected at load time
//! - a [`cache::CacheRegistry`] holds parsed gadget definitions and preload
//!   results shared by all requests
//! - the [`handler::RequestHandler`] wires fetcher, caches and pipelines
//!
//! Each request then builds a [`gadget::Gadget`] (definition plus request
//! context) and runs the [`render::GadgetPipeline`] over a mutable
//! document. Stages run strictly in order and the document is written once,
//! after the last stage, or not at all.
//!
//! # Core Modules
//!
//! ## Features and Containers
//! - [`features`] - Feature manifests, script definitions and feature sets
//! - [`resolver`] - Dependency graph with cached topological resolution
//! - [`container`] - Containers and the container registry
//!
//! ## Gadgets
//! - [`gadget`] - Gadget definitions, the manifest parser, locales and
//!   request contexts
//! - [`cache`] - Named caches and the definition factory
//! - [`fetch`] - HTTP fetching behind a trait, with per-request deadlines
//!
//! ## Rendering
//! - [`document`] - The mutable document the stages operate on
//! - [`render`] - Gadget and container pipelines and their stages
//! - [`handler`] - Request orchestration and error payloads
//!
//! ## Supporting Modules
//! - [`config`] - Server configuration
//! - [`core`] - Error types and user-facing error reporting
//! - [`cli`] - The `gadgetc` command-line interface
//! - [`utils`] - Escaping, URL encoding and retry backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use gadget_container::config::ServerConfig;
//! use gadget_container::gadget::GadgetContext;
//! use gadget_container::handler::RequestHandler;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::load(Path::new("gadgets.toml"))?;
//! let handler = RequestHandler::from_config(&config)?;
//!
//! let context = GadgetContext::new("default", "http://example.com/gadget.xml").with_view("canvas");
//! let html = handler.create(context).await?;
//! println!("{html}");
//! # Ok(())
//! # }
//! ```

// Features and containers
pub mod container;
pub mod features;
pub mod resolver;

// Gadgets
pub mod cache;
pub mod fetch;
pub mod gadget;

// Rendering
pub mod document;
pub mod handler;
pub mod render;

// Supporting modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
