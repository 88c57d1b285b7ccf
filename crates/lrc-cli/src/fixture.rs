//! Fetch collaborator reading recorded pages from disk.
//!
//! Layout: `<dir>/<source>/<account>/<category>.json`, each a JSON array of
//! records. A missing file is an empty stream. `<dir>/<source>/balances.json`
//! (`{"<account>": "<decimal>"}`) supplies reported balances.
//!
//! Records are served in pages of the requested size, sliced by offset, with
//! `{current, last}` metadata on every page.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lrc_runtime::SourceDescriptor;
use lrc_schemas::{Category, RawRecord};
use lrc_source::{FetchError, Page, PageCursor, SourceFetcher};
use rust_decimal::Decimal;
use serde_json::Value;

pub struct FixtureSource {
    name: String,
    first_page: u64,
    streams: HashMap<(String, Category), Vec<RawRecord>>,
    balances: BTreeMap<String, Decimal>,
}

impl FixtureSource {
    pub fn load(dir: &Path, descriptor: &SourceDescriptor) -> Result<Self> {
        let root = dir.join(&descriptor.name);
        let mut streams = HashMap::new();
        for account in &descriptor.accounts {
            for spec in &descriptor.categories {
                let path = root
                    .join(account)
                    .join(format!("{}.json", spec.category.as_str()));
                if !path.exists() {
                    continue;
                }
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("read fixture failed: {}", path.display()))?;
                let v: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("fixture is not json: {}", path.display()))?;
                let Value::Array(items) = v else {
                    bail!("fixture must be a json array: {}", path.display());
                };
                let mut records = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match RawRecord::from_value(item) {
                        Some(r) => records.push(r),
                        None => bail!("fixture record #{i} is not an object: {}", path.display()),
                    }
                }
                streams.insert((account.clone(), spec.category), records);
            }
        }

        let balances_path = root.join("balances.json");
        let balances = if balances_path.exists() {
            let raw = fs::read_to_string(&balances_path)
                .with_context(|| format!("read balances failed: {}", balances_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse balances failed: {}", balances_path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            name: descriptor.name.clone(),
            first_page: descriptor.pagination.first_page,
            streams,
            balances,
        })
    }
}

#[async_trait]
impl SourceFetcher for FixtureSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &self,
        account: &str,
        category: Category,
        cursor: &PageCursor,
    ) -> Result<Page, FetchError> {
        let Some(records) = self.streams.get(&(account.to_string(), category)) else {
            return Ok(Page::default());
        };
        let size = cursor.page_size.max(1);
        let start = usize::try_from(cursor.offset)
            .map_err(|_| FetchError::Config(format!("offset {} out of range", cursor.offset)))?;
        let end = (start + size).min(records.len());
        let slice = records.get(start..end).unwrap_or_default().to_vec();
        let pages = records.len().div_ceil(size) as u64;
        let last = self.first_page + pages.saturating_sub(1);
        Ok(Page::with_meta(slice, cursor.page, last))
    }

    async fn fetch_balance(&self, account: &str) -> Result<Option<Decimal>, FetchError> {
        Ok(self.balances.get(account).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> SourceDescriptor {
        serde_json::from_value(json!({
            "name": "kraken",
            "accounts": ["main"],
            "pagination": {"first_page": 1, "page_size": 2},
            "categories": [{
                "category": "deposit",
                "key": {"field": "id"},
                "fields": {"timestamp": "time", "amount": "amount", "asset": {"fixed": "USD"}}
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn pages_are_sliced_by_offset() {
        let dir = tempfile::tempdir().unwrap();
        let acct = dir.path().join("kraken").join("main");
        fs::create_dir_all(&acct).unwrap();
        fs::write(
            acct.join("deposit.json"),
            r#"[{"id":1},{"id":2},{"id":3}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("kraken").join("balances.json"), r#"{"main":"1.5"}"#).unwrap();

        let src = FixtureSource::load(dir.path(), &descriptor()).unwrap();
        let cursor = |page, offset| PageCursor {
            page,
            offset,
            page_size: 2,
        };

        let p1 = src.fetch_page("main", Category::Deposit, &cursor(1, 0)).await.unwrap();
        assert_eq!(p1.records.len(), 2);
        assert!(!p1.meta.unwrap().is_last());

        let p2 = src.fetch_page("main", Category::Deposit, &cursor(2, 2)).await.unwrap();
        assert_eq!(p2.records.len(), 1);
        assert!(p2.meta.unwrap().is_last());

        let past = src.fetch_page("main", Category::Deposit, &cursor(3, 4)).await.unwrap();
        assert!(past.records.is_empty());

        assert_eq!(
            src.fetch_balance("main").await.unwrap(),
            Some(Decimal::new(15, 1))
        );
    }

    #[test]
    fn non_array_fixture_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let acct = dir.path().join("kraken").join("main");
        fs::create_dir_all(&acct).unwrap();
        fs::write(acct.join("deposit.json"), r#"{"id":1}"#).unwrap();

        let err = FixtureSource::load(dir.path(), &descriptor()).err().unwrap();
        assert!(err.to_string().contains("json array"));
    }
}
