//! # replica-store
//!
//! SQLite-backed document store for Replica conversations.

pub mod audit;
pub mod store;
pub mod watcher;

pub use audit::AuditLogger;
pub use store::Store;
pub use watcher::ChatWatcher;
