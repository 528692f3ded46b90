//! Data types for the analysis pipeline.

pub mod config;
pub mod content;
pub mod product;
pub mod state;
