//! lrc-runtime
//!
//! Runs reconciliation passes:
//! - [`config`]: typed view of the layered config (`/pass`, `/sources`)
//! - [`descriptor`]: per-source strategy object and its fail-fast validation
//! - [`store`]: the store collaborator contract
//! - [`orchestrator`]: fan-out over accounts and categories, merge, reconcile
//!
//! Fetch failures degrade to partial results. Configuration and store
//! failures abort the pass before anything is fetched.

pub mod config;
pub mod descriptor;
pub mod orchestrator;
pub mod store;

pub use config::{PassOptions, ReconcileConfig, DEFAULT_MAX_CONCURRENCY};
pub use descriptor::{DescriptorError, SourceDescriptor};
pub use orchestrator::{commit_new_entries, FetchFailure, PassError, ReconcilePass, SourceReport};
pub use store::LedgerStore;
