//! AI implementations.
//!
//! Reference implementations of the [`AI`](crate::traits::ai::AI) trait.
//! Tests use [`MockAI`](crate::testing::MockAI) instead.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAI;
