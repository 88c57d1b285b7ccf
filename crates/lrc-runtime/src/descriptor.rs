//! Per-source strategy object.
//!
//! One [`SourceDescriptor`] replaces what would otherwise be a hand-written
//! client per explorer or exchange: it names the accounts, how pages are
//! walked, how each category is keyed and normalized, and how the balance is
//! checked. Validation runs before any fetch and is the only fail-fast path
//! of a pass.

use std::collections::HashSet;
use std::fmt;

use lrc_reconcile::{BalancePolicy, MAX_PRECISION};
use lrc_schemas::Category;
use lrc_source::{CategorySpec, HttpSourceSpec, KeyRule, PaginationStyle, PairOperand};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    pub pagination: PaginationStyle,
    /// Minimum spacing between requests to this source, shared by all its fetches.
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
    #[serde(default)]
    pub balance: BalancePolicy,
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
    /// Request layout when the source is fetched over HTTP.
    #[serde(default)]
    pub http: Option<HttpSourceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The config section could not be deserialized.
    Malformed(String),
    EmptyName,
    DuplicateSource { source: String },
    NoAccounts { source: String },
    BlankAccount { source: String, index: usize },
    /// A category pairs on the account id, which must then be an integer.
    NonIntegerAccount { source: String, account: String },
    ZeroPageSize { source: String },
    BadFirstPage { source: String, first_page: u64 },
    PrecisionTooLarge { source: String, precision: u32 },
    NoCategories { source: String },
    DuplicateCategory { source: String, category: Category },
    BlankKeyField { source: String, category: Category },
    ZeroConcurrency,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Malformed(msg) => write!(f, "malformed config: {msg}"),
            DescriptorError::EmptyName => write!(f, "source name is empty"),
            DescriptorError::DuplicateSource { source } => {
                write!(f, "source '{source}' is configured twice")
            }
            DescriptorError::NoAccounts { source } => {
                write!(f, "source '{source}' has no accounts")
            }
            DescriptorError::BlankAccount { source, index } => {
                write!(f, "source '{source}' account #{index} is blank")
            }
            DescriptorError::NonIntegerAccount { source, account } => write!(
                f,
                "source '{source}' pairs keys on the account id, but '{account}' is not an integer"
            ),
            DescriptorError::ZeroPageSize { source } => {
                write!(f, "source '{source}' page_size must be at least 1")
            }
            DescriptorError::BadFirstPage { source, first_page } => {
                write!(f, "source '{source}' first_page must be 0 or 1, got {first_page}")
            }
            DescriptorError::PrecisionTooLarge { source, precision } => write!(
                f,
                "source '{source}' balance precision {precision} exceeds {MAX_PRECISION}"
            ),
            DescriptorError::NoCategories { source } => {
                write!(f, "source '{source}' has no categories")
            }
            DescriptorError::DuplicateCategory { source, category } => {
                write!(f, "source '{source}' lists category {category} twice")
            }
            DescriptorError::BlankKeyField { source, category } => {
                write!(f, "source '{source}' category {category} has a blank key field")
            }
            DescriptorError::ZeroConcurrency => write!(f, "pass.max_concurrency must be at least 1"),
        }
    }
}

impl std::error::Error for DescriptorError {}

impl SourceDescriptor {
    pub fn category(&self, category: Category) -> Option<&CategorySpec> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let source = self.name.trim();
        if source.is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        let source = source.to_string();

        if self.accounts.is_empty() {
            return Err(DescriptorError::NoAccounts { source });
        }
        if let Some(index) = self.accounts.iter().position(|a| a.trim().is_empty()) {
            return Err(DescriptorError::BlankAccount { source, index });
        }

        if self.pagination.page_size == 0 {
            return Err(DescriptorError::ZeroPageSize { source });
        }
        if self.pagination.first_page > 1 {
            return Err(DescriptorError::BadFirstPage {
                source,
                first_page: self.pagination.first_page,
            });
        }
        if self.balance.precision > MAX_PRECISION {
            return Err(DescriptorError::PrecisionTooLarge {
                source,
                precision: self.balance.precision,
            });
        }

        if self.categories.is_empty() {
            return Err(DescriptorError::NoCategories { source });
        }
        let mut seen = HashSet::new();
        for spec in &self.categories {
            if !seen.insert(spec.category) {
                return Err(DescriptorError::DuplicateCategory {
                    source,
                    category: spec.category,
                });
            }
            if spec.key.field_names().iter().any(|f| f.trim().is_empty()) {
                return Err(DescriptorError::BlankKeyField {
                    source,
                    category: spec.category,
                });
            }
            if let KeyRule::Pair(ops) = &spec.key {
                if ops.contains(&PairOperand::Account) {
                    if let Some(bad) = self
                        .accounts
                        .iter()
                        .find(|a| a.trim().parse::<u64>().is_err())
                    {
                        return Err(DescriptorError::NonIntegerAccount {
                            source,
                            account: bad.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
