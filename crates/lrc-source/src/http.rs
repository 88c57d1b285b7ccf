//! Generic JSON-over-HTTP page source.
//!
//! Covers the common explorer/exchange shape: a GET endpoint per category,
//! the page index and page size passed as query parameters, the records
//! array somewhere in the JSON body, and optionally `{current, last}`
//! pagination metadata and a balance endpoint.
//!
//! The API key is resolved by the caller and passed in; it is never logged.

use std::collections::BTreeMap;

use async_trait::async_trait;
use lrc_schemas::{Category, RawRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::normalizer::parse_decimal;
use crate::provider::{FetchError, Page, PageCursor, PageMeta, SourceFetcher};
use crate::spec::CategorySpec;

fn default_page_param() -> String {
    "page".to_string()
}

fn default_size_param() -> String {
    "offset".to_string()
}

fn default_account_param() -> String {
    "address".to_string()
}

fn default_api_key_param() -> String {
    "apikey".to_string()
}

fn default_records_pointer() -> String {
    "/result".to_string()
}

/// Request layout of an HTTP source (`sources[].http` in config).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpSourceSpec {
    pub base_url: String,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_size_param")]
    pub size_param: String,
    #[serde(default = "default_account_param")]
    pub account_param: String,
    /// Static query parameters sent with every request.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_api_key_param")]
    pub api_key_param: String,
    /// JSON pointer to the records array.
    #[serde(default = "default_records_pointer")]
    pub records_pointer: String,
    #[serde(default)]
    pub current_page_pointer: Option<String>,
    #[serde(default)]
    pub last_page_pointer: Option<String>,
    #[serde(default)]
    pub balance_path: Option<String>,
    /// Extra query parameters for the balance request.
    #[serde(default)]
    pub balance_query: BTreeMap<String, String>,
    #[serde(default)]
    pub balance_pointer: Option<String>,
    #[serde(default)]
    pub balance_decimals: Option<u32>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    path: String,
    query: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct HttpPageSource {
    name: String,
    spec: HttpSourceSpec,
    endpoints: BTreeMap<Category, Endpoint>,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for HttpPageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPageSource")
            .field("name", &self.name)
            .field("base_url", &self.spec.base_url)
            .field("categories", &self.endpoints.keys().collect::<Vec<_>>())
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpPageSource {
    pub fn new(
        name: impl Into<String>,
        spec: HttpSourceSpec,
        categories: &[CategorySpec],
        api_key: Option<String>,
    ) -> Self {
        let endpoints = categories
            .iter()
            .map(|c| {
                (
                    c.category,
                    Endpoint {
                        path: c.path.clone().unwrap_or_default(),
                        query: c.query.clone(),
                    },
                )
            })
            .collect();
        Self {
            name: name.into(),
            spec,
            endpoints,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.spec.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    fn base_query(&self, account: &str) -> Vec<(String, String)> {
        let mut q: Vec<(String, String)> = self
            .spec
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        q.push((self.spec.account_param.clone(), account.to_string()));
        if let Some(key) = &self.api_key {
            q.push((self.spec.api_key_param.clone(), key.clone()));
        }
        q
    }

    async fn get_json(&self, url: String, query: &[(String, String)]) -> Result<Value, FetchError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Api {
                code: Some(i64::from(status.as_u16())),
                message: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn pointer_u64(body: &Value, pointer: &str) -> Option<u64> {
    match body.pointer(pointer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl SourceFetcher for HttpPageSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(
        &self,
        account: &str,
        category: Category,
        cursor: &PageCursor,
    ) -> Result<Page, FetchError> {
        let endpoint = self.endpoints.get(&category).ok_or_else(|| {
            FetchError::Config(format!("{} has no endpoint for {category}", self.name))
        })?;

        let mut query = self.base_query(account);
        query.extend(endpoint.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        query.push((self.spec.page_param.clone(), cursor.page.to_string()));
        query.push((self.spec.size_param.clone(), cursor.page_size.to_string()));

        debug!(source = %self.name, account, category = %category, page = cursor.page, "GET page");
        let body = self.get_json(self.url(&endpoint.path), &query).await?;

        let records = match body.pointer(&self.spec.records_pointer) {
            Some(Value::Array(items)) => items
                .iter()
                .cloned()
                .map(|v| {
                    RawRecord::from_value(v)
                        .ok_or_else(|| FetchError::Decode("record is not a JSON object".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::String(msg)) => {
                return Err(FetchError::Api {
                    code: None,
                    message: msg.clone(),
                })
            }
            _ => {
                return Err(FetchError::Decode(format!(
                    "no records array at {}",
                    self.spec.records_pointer
                )))
            }
        };

        let meta = match (&self.spec.current_page_pointer, &self.spec.last_page_pointer) {
            (Some(cp), Some(lp)) => match (pointer_u64(&body, cp), pointer_u64(&body, lp)) {
                (Some(current), Some(last)) => Some(PageMeta { current, last }),
                _ => None,
            },
            _ => None,
        };

        Ok(Page { records, meta })
    }

    async fn fetch_balance(&self, account: &str) -> Result<Option<Decimal>, FetchError> {
        let Some(path) = &self.spec.balance_path else {
            return Ok(None);
        };
        let pointer = self.spec.balance_pointer.as_deref().unwrap_or("/result");

        let mut query = self.base_query(account);
        query.extend(
            self.spec
                .balance_query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let body = self.get_json(self.url(path), &query).await?;

        let value = body
            .pointer(pointer)
            .ok_or_else(|| FetchError::Decode(format!("no balance at {pointer}")))?;
        parse_decimal(value, self.spec.balance_decimals.unwrap_or(0))
            .map(Some)
            .ok_or_else(|| FetchError::Decode(format!("balance is not a decimal: {value}")))
    }
}
