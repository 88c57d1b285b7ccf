//! lrc-schemas
//!
//! Canonical data model shared by every reconciliation crate:
//! - [`RawRecord`]: one source record exactly as a page returned it
//! - [`Key`]: canonical identity of a ledger entry (incl. Szudzik pairing)
//! - [`LedgerEntry`]: normalized, signed, decimal ledger line
//! - [`AccountHistory`]: per-account entries grouped by [`Category`], deduplicated by `(Key, category)`
//!
//! Pure types. No IO.

mod entry;
mod history;
mod key;
mod record;

pub use entry::{Category, LedgerEntry};
pub use history::{AccountHistory, CategoryHistory};
pub use key::{pair, unpair, Key, KeyError};
pub use record::{ParseFlag, RawRecord, PARSE_FLAGS_FIELD};
