//! SWE-bench rows from the HuggingFace datasets server.
//!
//! Pages through the `rows` endpoint until the split is exhausted. Transient
//! failures (rate limiting, transport errors) are retried with a fixed delay;
//! anything else surfaces as a [`CatalogError`].

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::RawProblemRow;
use crate::error::CatalogError;

/// Base URL for HuggingFace datasets server rows API.
const HUGGINGFACE_ROWS_API: &str = "https://datasets-server.huggingface.co/rows";

/// Settings for paging through a HuggingFace dataset.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    /// Delay between requests (and between retries) in milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Rows per request; the rows API caps this at 100.
    pub page_size: usize,
    /// Maximum retry attempts per page.
    pub max_retries: u32,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: 100,
            page_size: 100,
            max_retries: 3,
        }
    }
}

/// Client for one dataset split.
pub struct HuggingFaceDataset {
    http_client: Client,
    dataset_name: String,
    split: String,
    config: HuggingFaceConfig,
}

impl HuggingFaceDataset {
    /// Creates a client for the given dataset and split.
    pub fn new(
        dataset_name: impl Into<String>,
        split: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CatalogError::HttpError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            dataset_name: dataset_name.into(),
            split: split.into(),
            config: HuggingFaceConfig::default(),
        })
    }

    /// Overrides paging and retry settings.
    pub fn with_config(mut self, config: HuggingFaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Dataset identifier (e.g. `princeton-nlp/SWE-bench_Verified`).
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Split name.
    pub fn split(&self) -> &str {
        &self.split
    }

    fn page_url(&self, offset: usize) -> String {
        format!(
            "{}?dataset={}&config=default&split={}&offset={}&length={}",
            HUGGINGFACE_ROWS_API, self.dataset_name, self.split, offset, self.config.page_size
        )
    }

    /// Fetches every row of the split.
    pub async fn fetch_all(&self) -> Result<Vec<RawProblemRow>, CatalogError> {
        info!(
            dataset = %self.dataset_name,
            split = %self.split,
            "Downloading benchmark dataset"
        );

        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.fetch_page_with_retry(offset).await?;
            let received = page.rows.len();
            rows.extend(page.rows.into_iter().map(|r| r.row));
            offset += received;

            debug!(offset, total = ?page.num_rows_total, "Fetched dataset page");

            let exhausted = match page.num_rows_total {
                Some(total) => offset >= total,
                None => received < self.config.page_size,
            };
            if received == 0 || exhausted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.rate_limit_delay_ms)).await;
        }

        info!(rows = rows.len(), dataset = %self.dataset_name, "Dataset downloaded");
        Ok(rows)
    }

    async fn fetch_page_with_retry(&self, offset: usize) -> Result<RowsResponse, CatalogError> {
        let mut attempt = 0;
        loop {
            match self.fetch_page(offset).await {
                Ok(page) => return Ok(page),
                Err(e @ (CatalogError::RateLimited { .. } | CatalogError::HttpError(_)))
                    if attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    let delay = match &e {
                        CatalogError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => Duration::from_millis(self.config.rate_limit_delay_ms * 2u64.pow(attempt)),
                    };
                    warn!(offset, attempt, error = %e, "Dataset page request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_page(&self, offset: usize) -> Result<RowsResponse, CatalogError> {
        let response = self
            .http_client
            .get(self.page_url(offset))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CatalogError::HttpError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(CatalogError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("API returned status {}: {}", status, error_text);
            return Err(if status.is_server_error() {
                CatalogError::HttpError(message)
            } else {
                CatalogError::ParseError(message)
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(format!("Failed to parse response: {}", e)))
    }
}

/// Response structure from HuggingFace rows API.
#[derive(Debug, Deserialize)]
struct RowsResponse {
    rows: Vec<RowEnvelope>,
    num_rows_total: Option<usize>,
}

/// A single row with its index.
#[derive(Debug, Deserialize)]
struct RowEnvelope {
    row: RawProblemRow,
}
