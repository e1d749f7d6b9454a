//! # replica-core
//!
//! Core types, traits, configuration, and error handling for Replica.

pub mod config;
pub mod context;
pub mod error;
pub mod humanize;
pub mod message;
pub mod path;
pub mod traits;

pub use config::shellexpand;
