//! HTTP row transport.
//!
//! Executes the bulk-fetch and CRUD passthrough calls against the hosted
//! service's table endpoints, with bounded retry on transient transport
//! failures.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Instant;

use crate::auth::AuthProvider;
use crate::error::{MirrorError, Result};
use crate::models::{QuerySpec, Row};

/// Error envelope the server attaches to failed row operations.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Handles row operations via HTTP.
#[derive(Clone)]
pub(crate) struct RowExecutor {
    base_url: String,
    http_client: reqwest::Client,
    auth: AuthProvider,
    max_retries: u32,
}

impl RowExecutor {
    pub(crate) fn new(
        base_url: String,
        http_client: reqwest::Client,
        auth: AuthProvider,
        max_retries: u32,
    ) -> Self {
        Self {
            base_url,
            http_client,
            auth,
            max_retries,
        }
    }

    fn rows_url(&self, table: &str) -> String {
        format!("{}/v1/tables/{}/rows", self.base_url, table)
    }

    fn row_url(&self, table: &str, id: &str) -> String {
        format!("{}/v1/tables/{}/rows/{}", self.base_url, table, id)
    }

    /// Translate a query spec into URL parameters.
    fn query_params(query: &QuerySpec) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &query.filter {
            params.push(("filter_column".to_string(), filter.column.clone()));
            // Non-string values travel JSON-encoded so types survive the URL
            let value = match &filter.value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            params.push(("filter_value".to_string(), value));
        }
        if let Some(projection) = &query.projection {
            params.push(("select".to_string(), projection.join(",")));
        }
        params
    }

    pub(crate) async fn fetch(&self, table: &str, query: &QuerySpec) -> Result<Vec<Row>> {
        let url = self.rows_url(table);
        let params = Self::query_params(query);
        let response = self
            .send_with_retry("fetch", || {
                self.auth
                    .apply_to_request(self.http_client.get(&url).query(&params))
            })
            .await?;
        Ok(response.json::<Vec<Row>>().await?)
    }

    pub(crate) async fn insert(&self, table: &str, row: &Row) -> Result<Row> {
        let url = self.rows_url(table);
        let response = self
            .send_with_retry("insert", || {
                self.auth.apply_to_request(self.http_client.post(&url).json(row))
            })
            .await?;
        Ok(response.json::<Row>().await?)
    }

    pub(crate) async fn upsert(&self, table: &str, row: &Row) -> Result<Row> {
        let url = self.rows_url(table);
        let response = self
            .send_with_retry("upsert", || {
                self.auth.apply_to_request(self.http_client.put(&url).json(row))
            })
            .await?;
        Ok(response.json::<Row>().await?)
    }

    pub(crate) async fn update(&self, table: &str, id: &str, partial: &Row) -> Result<()> {
        let url = self.row_url(table, id);
        self.send_with_retry("update", || {
            self.auth
                .apply_to_request(self.http_client.patch(&url).json(partial))
        })
        .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let url = self.row_url(table, id);
        self.send_with_retry("delete", || {
            self.auth.apply_to_request(self.http_client.delete(&url))
        })
        .await?;
        Ok(())
    }

    pub(crate) async fn delete_where(&self, table: &str, query: &QuerySpec) -> Result<()> {
        let url = self.rows_url(table);
        let params = Self::query_params(query);
        self.send_with_retry("delete_where", || {
            self.auth
                .apply_to_request(self.http_client.delete(&url).query(&params))
        })
        .await?;
        Ok(())
    }

    /// Send a request, retrying transient transport failures with a short
    /// linear backoff. Server-side errors are never retried.
    async fn send_with_retry(
        &self,
        op: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let overall_start = Instant::now();
        let mut retries = 0;

        loop {
            let attempt_start = Instant::now();
            debug!(
                "[ROWS] {} attempt {}/{}",
                op,
                retries + 1,
                self.max_retries + 1
            );

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(
                        "[ROWS] {} response: status={} duration_ms={}",
                        op,
                        status,
                        attempt_start.elapsed().as_millis()
                    );

                    if status.is_success() {
                        return Ok(response);
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let message = match serde_json::from_str::<ErrorBody>(&error_text) {
                        Ok(ErrorBody { error: Some(detail) }) => detail.message,
                        _ => error_text,
                    };
                    warn!(
                        "[ROWS] {} server error: status={} message=\"{}\"",
                        op, status, message
                    );
                    return Err(MirrorError::ServerError {
                        status_code: status.as_u16(),
                        message,
                    });
                }
                Err(e) if retries < self.max_retries && Self::is_retriable(&e) => {
                    warn!(
                        "[ROWS] {} retriable error (attempt {}/{}): {}",
                        op,
                        retries + 1,
                        self.max_retries + 1,
                        e
                    );
                    retries += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(100 * retries as u64))
                        .await;
                }
                Err(e) => {
                    warn!(
                        "[ROWS] {} fatal error: {} total_ms={}",
                        op,
                        e,
                        overall_start.elapsed().as_millis()
                    );
                    return Err(e.into());
                }
            }
        }
    }

    fn is_retriable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}
