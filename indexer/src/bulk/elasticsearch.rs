use config::shared::SearchConfig;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use crate::bail;
use crate::bulk::{BulkResponse, BulkSink};
use crate::error::{ErrorKind, IndexerResult};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends bulk requests to the `_bulk` endpoint of an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    url: String,
}

impl ElasticsearchSink {
    pub fn new(config: &SearchConfig) -> IndexerResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: config.bulk_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BulkSink for ElasticsearchSink {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn send(&self, payload: String) -> IndexerResult<BulkResponse> {
        debug!(url = %self.url, bytes = payload.len(), "sending bulk request");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            bail!(
                ErrorKind::BulkRequestFailed,
                "Search backend rejected the bulk request",
                format!("status {status}: {body}")
            );
        }

        Ok(BulkResponse {
            status: status.as_u16(),
            body,
        })
    }
}
