//! lrc-source
//!
//! Everything between a remote source and a normalized [`AccountHistory`]:
//! - [`provider`]: the fetch collaborator contract (`fetch_page(cursor)`)
//! - [`spec`]: declarative per-source pagination and per-category field rules
//! - [`paginator`]: drives page fetches until exhaustion, partial result on error
//! - [`rate_gate`]: minimum spacing between requests, shared by all fetchers of one source
//! - [`keys`]: canonical key derivation rules
//! - [`normalizer`]: raw record -> [`LedgerEntry`](lrc_schemas::LedgerEntry)
//! - [`http`]: a generic JSON-over-HTTP page source
//!
//! It does **not** talk to the store and does not decide what is new.
//!
//! [`AccountHistory`]: lrc_schemas::AccountHistory

pub mod http;
pub mod keys;
pub mod normalizer;
pub mod paginator;
pub mod provider;
pub mod rate_gate;
pub mod spec;

pub use http::{HttpPageSource, HttpSourceSpec};
pub use keys::derive_key;
pub use normalizer::{normalize, normalize_records, tracked_set, NormalizeContext, Normalized};
pub use paginator::{Collected, Paginator, StopReason};
pub use provider::{FetchError, Page, PageCursor, PageMeta, SourceFetcher};
pub use rate_gate::RateGate;
pub use spec::{
    AssetRef, CategorySpec, Direction, FeeRule, FieldMap, KeyRule, PaginationStyle, PairOperand,
    Termination, TimestampFormat,
};
