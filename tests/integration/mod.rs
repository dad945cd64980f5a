//! Integration test suite for the gadget container
//!
//! End-to-end tests that load a feature registry from disk, wire a
//! [`RequestHandler`](gadget_container::handler::RequestHandler) to an
//! in-memory fetcher and render real manifests.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! Tests are organized by functionality area:
//! - **cli**: The `gadgetc` binary against a deployment directory
//! - **feature_resolution**: Feature registries, dependency order, container scripts
//! - **handler**: Request orchestration, caching, metadata and error payloads
//! - **render_pipeline**: The six gadget stages and their document output

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli;
mod feature_resolution;
mod handler;
mod render_pipeline;
