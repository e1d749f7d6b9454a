//! # replica-providers
//!
//! Language model provider implementations for Replica.

pub mod gemini;

pub use gemini::GeminiProvider;
