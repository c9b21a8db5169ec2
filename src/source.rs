//! Read access to the `gift-cards` table.
//!
//! `SupabaseSource` talks to the PostgREST endpoint of a hosted database.
//! `InMemorySource` backs tests and the demo mode, and `UnconfiguredSource`
//! stands in when no credentials are present so the dashboard still renders.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::row::{value_text, GiftCardRow, COL_BATCH_ID};

pub const DEFAULT_TABLE: &str = "gift-cards";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid database address '{address}': {message}")]
    InvalidAddress { address: String, message: String },
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

pub trait GiftCardSource: Send + Sync + 'static {
    /// Every `batch_id` in the table, newest first. May contain repeats.
    fn batch_ids(&self) -> Result<Vec<String>, SourceError>;

    /// All rows whose `batch_id` equals `batch_id`.
    fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub address: String,
    pub api_key: String,
    pub table: String,
    pub timeout_ms: u64,
}

impl SupabaseConfig {
    pub fn new(address: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Minimal GET transport so the source can be exercised without a network.
pub trait HttpFetcher: Send + Sync {
    fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, SourceError>;
}

pub struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl ReqwestBlockingFetcher {
    pub fn new(api_key: impl Into<String>, timeout_ms: u64) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| SourceError::HttpClientBuild(err.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in auth_headers(&self.api_key) {
            request = request.header(name, value);
        }

        let response = request.send().map_err(|err| SourceError::HttpRequest {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SourceError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

/// Headers PostgREST behind Supabase expects for an anonymous-key read.
pub fn auth_headers(api_key: &str) -> [(&'static str, String); 3] {
    [
        ("apikey", api_key.to_string()),
        ("Authorization", format!("Bearer {api_key}")),
        ("Accept", "application/json".to_string()),
    ]
}

pub struct SupabaseSource {
    table_url: Url,
    fetcher: Box<dyn HttpFetcher>,
}

impl SupabaseSource {
    /// Builds the blocking client; call outside an async runtime.
    pub fn connect(cfg: &SupabaseConfig) -> Result<Self, SourceError> {
        let table_url = table_url(&cfg.address, &cfg.table)?;
        let fetcher = ReqwestBlockingFetcher::new(cfg.api_key.clone(), cfg.timeout_ms)?;
        Ok(Self {
            table_url,
            fetcher: Box::new(fetcher),
        })
    }

    pub fn with_fetcher(
        cfg: &SupabaseConfig,
        fetcher: Box<dyn HttpFetcher>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            table_url: table_url(&cfg.address, &cfg.table)?,
            fetcher,
        })
    }

    pub fn batch_ids_url(&self) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", COL_BATCH_ID)
            .append_pair("order", "batch_id.desc");
        url
    }

    pub fn rows_url(&self, batch_id: &str) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair(COL_BATCH_ID, &format!("eq.{batch_id}"));
        url
    }

    fn fetch_json<T: for<'de> Deserialize<'de>>(&self, url: &Url) -> Result<T, SourceError> {
        debug!(component = "source", event = "source.request", url = %url);
        let body = self.fetcher.get_bytes(url)?;
        serde_json::from_slice(&body).map_err(|err| SourceError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct BatchIdRecord {
    #[serde(default)]
    batch_id: Value,
}

impl GiftCardSource for SupabaseSource {
    fn batch_ids(&self) -> Result<Vec<String>, SourceError> {
        let records: Vec<BatchIdRecord> = self.fetch_json(&self.batch_ids_url())?;
        Ok(records
            .iter()
            .map(|record| value_text(&record.batch_id))
            .filter(|batch_id| !batch_id.is_empty())
            .collect())
    }

    fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError> {
        self.fetch_json(&self.rows_url(batch_id))
    }
}

fn table_url(address: &str, table: &str) -> Result<Url, SourceError> {
    let raw = format!("{}/rest/v1/{}", address.trim().trim_end_matches('/'), table);
    Url::parse(&raw).map_err(|err| SourceError::InvalidAddress {
        address: address.to_string(),
        message: err.to_string(),
    })
}

/// Source used when no database credentials are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSource;

impl GiftCardSource for UnconfiguredSource {
    fn batch_ids(&self) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }

    fn rows_for_batch(&self, _batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySource {
    inner: Arc<RwLock<Vec<GiftCardRow>>>,
}

impl InMemorySource {
    pub fn new(rows: Vec<GiftCardRow>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(rows)),
        }
    }

    pub fn demo() -> Self {
        Self::new(demo_rows())
    }

    pub fn replace_rows(&self, rows: Vec<GiftCardRow>) {
        let mut guard = self
            .inner
            .write()
            .expect("in-memory rows lock should not be poisoned");
        *guard = rows;
    }
}

impl GiftCardSource for InMemorySource {
    fn batch_ids(&self) -> Result<Vec<String>, SourceError> {
        let rows = self
            .inner
            .read()
            .expect("in-memory rows lock should not be poisoned");
        let mut ids: Vec<String> = rows.iter().map(GiftCardRow::batch_id).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError> {
        let rows = self
            .inner
            .read()
            .expect("in-memory rows lock should not be poisoned");
        Ok(rows
            .iter()
            .filter(|row| row.batch_id() == batch_id)
            .cloned()
            .collect())
    }
}

/// Two small snapshots covering every tab.
pub fn demo_rows() -> Vec<GiftCardRow> {
    let listings = [
        ("Steam", "Eneba", 20, "$20.00", "$17.45", true, "eneba.com"),
        ("Steam", "G2A", 20, "$20.00", "$18.10", true, "g2a.com"),
        ("Steam", "Kinguin", 50, "$50.00", "$44.90", false, "kinguin.net"),
        ("Valorant", "Eneba", 25, "$25.00", "$22.30", true, "eneba.com"),
        ("Valorant", "Driffle", 50, "$50.00", "$43.75", true, "driffle.com"),
        ("iOS", "G2A", 10, "$10.00", "$9.20", true, "g2a.com"),
        ("iOS", "Kinguin", 25, "$25.00", "$23.05", false, "kinguin.net"),
        ("PSN", "Eneba", 50, "$50.00", "$45.60", true, "eneba.com"),
        ("PSN", "CDKeys", 100, "$100.00", "$88.99", true, "cdkeys.com"),
    ];
    let batches = ["2024-06-01T00:00:00Z", "2024-05-01T00:00:00Z"];

    let mut rows = Vec::with_capacity(listings.len() * batches.len());
    let mut next_id = 1;
    for batch_id in batches {
        for (card, seller, amount, retail, discounted, available, source) in listings {
            let row: GiftCardRow = serde_json::from_value(json!({
                "id": next_id,
                "batch_id": batch_id,
                "card": card,
                "seller": seller,
                "amount": amount,
                "retail-price": retail,
                "discounted-price": discounted,
                "availability": available,
                "source": source,
            }))
            .unwrap_or_default();
            rows.push(row);
            next_id += 1;
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockFetcher {
        responses: HashMap<String, Result<Vec<u8>, u16>>,
        requested: Arc<Mutex<Vec<String>>>,
    }

    impl MockFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.responses
                .insert(url.to_string(), Ok(body.as_bytes().to_vec()));
            self
        }

        fn with_status(mut self, url: &str, status: u16) -> Self {
            self.responses.insert(url.to_string(), Err(status));
            self
        }
    }

    impl HttpFetcher for MockFetcher {
        fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
            self.requested
                .lock()
                .expect("request log lock")
                .push(url.to_string());
            match self.responses.get(url.as_str()) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(SourceError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(SourceError::HttpRequest {
                    url: url.to_string(),
                    message: "no canned response".to_string(),
                }),
            }
        }
    }

    const BATCHES_URL: &str =
        "https://db.example.co/rest/v1/gift-cards?select=batch_id&order=batch_id.desc";
    const ROWS_URL: &str =
        "https://db.example.co/rest/v1/gift-cards?select=*&batch_id=eq.2024-06-01T00%3A00Z";

    fn source(fetcher: MockFetcher) -> SupabaseSource {
        let cfg = SupabaseConfig::new("https://db.example.co/", "anon-key");
        SupabaseSource::with_fetcher(&cfg, Box::new(fetcher)).expect("valid address")
    }

    #[test]
    fn builds_postgrest_urls() {
        let src = source(MockFetcher::default());
        assert_eq!(src.batch_ids_url().as_str(), BATCHES_URL);
        assert_eq!(src.rows_url("2024-06-01T00:00Z").as_str(), ROWS_URL);
    }

    #[test]
    fn auth_headers_carry_key_twice() {
        let headers = auth_headers("k1");
        assert_eq!(headers[0], ("apikey", "k1".to_string()));
        assert_eq!(headers[1], ("Authorization", "Bearer k1".to_string()));
    }

    #[test]
    fn decodes_batch_ids_in_response_order() {
        let fetcher = MockFetcher::default().with(
            BATCHES_URL,
            r#"[{"batch_id":"2024-06-01T00:00Z"},{"batch_id":"2024-06-01T00:00Z"},{"batch_id":"2024-05-01T00:00Z"},{"batch_id":null}]"#,
        );
        let ids = source(fetcher).batch_ids().expect("batch ids decode");
        assert_eq!(
            ids,
            vec!["2024-06-01T00:00Z", "2024-06-01T00:00Z", "2024-05-01T00:00Z"]
        );
    }

    #[test]
    fn decodes_rows_for_batch() {
        let fetcher = MockFetcher::default().with(
            ROWS_URL,
            r#"[{"id":1,"batch_id":"2024-06-01T00:00Z","card":"Steam","seller":"A","amount":10,"availability":true}]"#,
        );
        let rows = source(fetcher)
            .rows_for_batch("2024-06-01T00:00Z")
            .expect("rows decode");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].seller(), "A");
    }

    #[test]
    fn http_status_and_bad_payloads_are_errors() {
        let fetcher = MockFetcher::default().with_status(BATCHES_URL, 401);
        let err = source(fetcher).batch_ids().expect_err("401 should fail");
        assert!(matches!(err, SourceError::Status { status: 401, .. }));

        let fetcher = MockFetcher::default().with(ROWS_URL, r#"[1, 2]"#);
        let err = source(fetcher)
            .rows_for_batch("2024-06-01T00:00Z")
            .expect_err("non-object rows should fail");
        assert!(matches!(err, SourceError::Decode { .. }));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let cfg = SupabaseConfig::new("not a url", "k");
        let err = SupabaseSource::with_fetcher(&cfg, Box::new(MockFetcher::default()))
            .err()
            .expect("bad address should fail");
        assert!(matches!(err, SourceError::InvalidAddress { .. }));
    }

    #[test]
    fn in_memory_source_partitions_by_batch() {
        let src = InMemorySource::demo();
        let ids = src.batch_ids().expect("in-memory never fails");
        assert_eq!(ids.first().map(String::as_str), Some("2024-06-01T00:00:00Z"));

        let rows = src
            .rows_for_batch("2024-05-01T00:00:00Z")
            .expect("in-memory never fails");
        assert_eq!(rows.len(), 9);
        assert!(rows.iter().all(|r| r.batch_id() == "2024-05-01T00:00:00Z"));
    }
}
