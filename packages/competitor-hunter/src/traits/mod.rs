//! Core trait abstractions for the analysis pipeline.
//!
//! These traits define the interfaces that applications implement
//! to provide the browser engine, the language model, storage and
//! screenshot handling.

pub mod ai;
pub mod browser;
pub mod screenshot;
pub mod store;
