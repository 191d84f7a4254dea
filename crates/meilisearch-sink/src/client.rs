//! HTTP client for the Meilisearch API.

use anyhow::Result;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use sync_core::{DataEvent, Document, SyncTarget};
use tokio::time::sleep;

use crate::write::{plan_batch, WriteOp};
use crate::MeiliError;

/// Maximum number of attempts for retriable request failures
const MAX_RETRIES: u32 = 5;
/// Base delay between retries (multiplied by the attempt number for backoff)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Connection settings for a Meilisearch server.
#[derive(Debug, Clone)]
pub struct MeiliConfig {
    /// Base URL, e.g. `http://localhost:7700`
    pub api_url: String,
    /// Master or API key, sent as bearer token
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for MeiliConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:7700".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`index_sink::IndexSink`] writing to Meilisearch.
pub struct MeilisearchSink {
    client: Client,
    config: MeiliConfig,
}

impl MeilisearchSink {
    pub fn new(config: MeiliConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &MeiliConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request built by `build`, retrying transport and 5xx failures.
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response, MeiliError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match build().send().await {
                Ok(response)
                    if response.status().is_success()
                        || response.status() == StatusCode::NOT_FOUND =>
                {
                    return Ok(response)
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    MeiliError::Api { status, body }
                }
                Err(e) => MeiliError::Http(e),
            };

            if !error.is_retriable() || attempt >= MAX_RETRIES {
                return Err(error);
            }
            let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64);
            tracing::warn!(
                "{what} failed (attempt {attempt}/{MAX_RETRIES}): {error}, retrying in {delay:?}"
            );
            sleep(delay).await;
        }
    }

    async fn add_documents(
        &self,
        index: &str,
        primary_key: &str,
        documents: &[Document],
    ) -> Result<(), MeiliError> {
        let path = format!("/indexes/{index}/documents");
        let response = self
            .send("add documents", || {
                self.request(Method::POST, &path)
                    .query(&[("primaryKey", primary_key)])
                    .json(documents)
            })
            .await?;
        ensure_found(response).await?;
        tracing::trace!("Enqueued {} documents for index '{index}'", documents.len());
        Ok(())
    }

    async fn delete_documents(&self, index: &str, ids: &[Value]) -> Result<(), MeiliError> {
        let path = format!("/indexes/{index}/documents/delete-batch");
        let response = self
            .send("delete documents", || {
                self.request(Method::POST, &path).json(ids)
            })
            .await?;
        ensure_found(response).await?;
        tracing::trace!("Enqueued deletion of {} documents from index '{index}'", ids.len());
        Ok(())
    }

    async fn apply(&self, target: &SyncTarget, ops: Vec<WriteOp>) -> Result<()> {
        for op in ops {
            match op {
                WriteOp::Upsert(docs) => {
                    self.add_documents(&target.index, &target.primary_key, &docs)
                        .await?
                }
                WriteOp::Delete(ids) => self.delete_documents(&target.index, &ids).await?,
            }
        }
        Ok(())
    }
}

/// Turn a 404 that slipped through `send` into an error for write endpoints.
async fn ensure_found(response: reqwest::Response) -> Result<(), MeiliError> {
    if response.status() == StatusCode::NOT_FOUND {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(MeiliError::Api { status, body });
    }
    Ok(())
}

#[async_trait::async_trait]
impl index_sink::IndexSink for MeilisearchSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let path = format!("/indexes/{index}");
        let response = self
            .send("get index", || self.request(Method::GET, &path))
            .await?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    async fn add_full_data(
        &self,
        index: &str,
        primary_key: &str,
        documents: Vec<Document>,
    ) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.add_documents(index, primary_key, &documents).await?;
        Ok(())
    }

    async fn handle_event(&self, event: &DataEvent, target: &SyncTarget) -> Result<()> {
        let ops = plan_batch(target, std::slice::from_ref(event))?;
        self.apply(target, ops).await
    }

    async fn handle_events(&self, target: &SyncTarget, events: &[DataEvent]) -> Result<()> {
        let ops = plan_batch(target, events)?;
        tracing::debug!(
            "Applying {} events to index '{}' in {} requests",
            events.len(),
            target.index,
            ops.len()
        );
        self.apply(target, ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let sink = MeilisearchSink::new(MeiliConfig {
            api_url: "http://meili:7700/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sink.url("/indexes/users"), "http://meili:7700/indexes/users");
        assert_eq!(sink.config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_retriable_statuses() {
        let server = MeiliError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let throttled = MeiliError::Api {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        let client = MeiliError::Api {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(server.is_retriable());
        assert!(throttled.is_retriable());
        assert!(!client.is_retriable());
        assert!(!MeiliError::MissingPrimaryKey("id".to_string()).is_retriable());
    }
}
