//! lrc-testkit
//!
//! In-process collaborators for scenario tests:
//! - [`ScriptedSource`]: pre-scripted pages per (account, category), injectable
//!   page and balance failures, call log with timestamps and concurrency peak
//! - [`MemoryStore`]: in-memory store keyed by (source, account, category)
//! - [`builders`]: raw record and descriptor shorthands
//!
//! No network, no database.

pub mod builders;
mod memory_store;
mod scripted;

pub use memory_store::MemoryStore;
pub use scripted::{FetchCall, ScriptedSource};
