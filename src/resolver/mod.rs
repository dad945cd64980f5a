//! Feature dependency resolution.
//!
//! See [`dependency_graph`] for the graph structure and the resolution walk.

pub mod dependency_graph;

pub use dependency_graph::{FeatureGraph, ResolvedFeatures};
