//! Core types for the gadget container
//!
//! This module holds the error taxonomy shared by every other module. Errors
//! are strongly typed ([`GadgetError`]) so that request handling can map them
//! to structured payloads, and they can be turned into colored, actionable CLI
//! output through [`user_friendly_error`].

pub mod error;

pub use error::{ErrorContext, GadgetError, find_gadget_error, user_friendly_error};
