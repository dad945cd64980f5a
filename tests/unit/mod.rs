//! Unit test suite for the gadget container
//!
//! Focused tests of public building blocks that are awkward to cover from
//! inside their own modules.
//!
//! ```bash
//! cargo test --test unit
//! ```
//!
//! - **manifest_parser**: Full manifests through the public parser API
//! - **pipeline**: Custom stage modules and pipeline ordering

mod pipeline;
