// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Elasticsearch destination over its REST API.
//!
//! # Requests
//!
//! ```text
//! PUT  /<index>   { settings, mappings }     200 created
//!                                            400 resource_already_exists_exception → ok
//! POST /_bulk     application/x-ndjson
//!      {"index":{"_index":"<index>","_id":"<id>"}}
//!      {...document body...}
//!      ...
//! ```
//!
//! The bulk API answers 200 even when individual items fail, so the response
//! body is inspected: any item error fails the whole batch. The reported
//! status is the first non-retryable item status if there is one, otherwise
//! the first item status (429/5xx), which keeps
//! [`is_retryable`](crate::ReplicationError::is_retryable) meaningful.

use crate::config::DestinationConfig;
use crate::destination::IndexSink;
use crate::document::IndexDocument;
use crate::error::{ReplicationError, Result};
use crate::source::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Longest response excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Writes documents to Elasticsearch.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: Client,
    base_url: String,
}

impl ElasticsearchSink {
    /// Create a sink for the cluster at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ReplicationError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a sink from the `destination` config section.
    pub fn from_config(config: &DestinationConfig) -> Result<Self> {
        let sink = Self::new(&config.url, config.request_timeout_duration())?;
        info!(url = %sink.base_url, index = %config.index, "Configured Elasticsearch destination");
        Ok(sink)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn create_index(&self, index: &str, definition: &Value) -> Result<()> {
        let response = self
            .client
            .put(self.url(index))
            .json(definition)
            .send()
            .await
            .map_err(|e| ReplicationError::http("ensure_index", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReplicationError::http("ensure_index", e))?;

        if status.is_success() {
            info!(index, "Created index");
            return Ok(());
        }

        if status == StatusCode::BAD_REQUEST && error_type(&body).as_deref() == Some(ALREADY_EXISTS) {
            debug!(index, "Index already exists");
            return Ok(());
        }

        Err(ReplicationError::http_status(
            "ensure_index",
            status.as_u16(),
            excerpt(&body),
        ))
    }

    async fn send_bulk(&self, index: &str, documents: &[IndexDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let body = bulk_body(index, documents)?;
        let response = self
            .client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| ReplicationError::http("bulk_upsert", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReplicationError::http("bulk_upsert", e))?;

        if !status.is_success() {
            return Err(ReplicationError::http_status(
                "bulk_upsert",
                status.as_u16(),
                excerpt(&text),
            ));
        }

        let parsed: BulkResponse = serde_json::from_str(&text).map_err(|e| {
            ReplicationError::http_status(
                "bulk_upsert",
                status.as_u16(),
                format!("unreadable bulk response: {e}"),
            )
        })?;

        check_bulk_response(&parsed, documents.len())?;
        debug!(index, documents = documents.len(), "Bulk upsert accepted");
        Ok(())
    }
}

impl IndexSink for ElasticsearchSink {
    fn ensure_index<'a>(&'a self, index: &'a str, definition: &'a Value) -> BoxFuture<'a, ()> {
        Box::pin(self.create_index(index, definition))
    }

    fn bulk_upsert<'a>(
        &'a self,
        index: &'a str,
        documents: &'a [IndexDocument],
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.send_bulk(index, documents))
    }
}

/// Render the NDJSON request body. Every line, including the last, ends in `\n`.
pub(crate) fn bulk_body(index: &str, documents: &[IndexDocument]) -> Result<String> {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        let source = serde_json::to_string(&doc.body)
            .map_err(|e| ReplicationError::Internal(format!("serialize document {}: {e}", doc.id)))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

fn check_bulk_response(response: &BulkResponse, sent: usize) -> Result<()> {
    if !response.errors {
        return Ok(());
    }

    // Each item is {"<action>": {"_id": ..., "status": ..., "error": {...}}}.
    let failures: Vec<(u16, String)> = response
        .items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter_map(|result| {
            let error = result.get("error")?;
            let status = result.get("status").and_then(Value::as_u64).unwrap_or(500);
            let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
            let reason = error
                .get("reason")
                .and_then(Value::as_str)
                .or_else(|| error.get("type").and_then(Value::as_str))
                .unwrap_or("unknown");
            Some((u16::try_from(status).unwrap_or(500), format!("{id}: {reason}")))
        })
        .collect();

    let Some((first_status, first_reason)) = failures.first().cloned() else {
        // errors=true without any item error; treat as a server-side fault.
        return Err(ReplicationError::http_status(
            "bulk_upsert",
            500,
            "bulk response reported errors without item details",
        ));
    };

    let status = failures
        .iter()
        .map(|(s, _)| *s)
        .find(|s| *s != 429 && *s < 500)
        .unwrap_or(first_status);

    warn!(
        rejected = failures.len(),
        sent,
        status,
        first = %first_reason,
        "Bulk upsert rejected documents"
    );

    Err(ReplicationError::http_status(
        "bulk_upsert",
        status,
        format!(
            "{} of {sent} documents rejected, first: {first_reason}",
            failures.len()
        ),
    ))
}

fn error_type(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("type")?
        .as_str()
        .map(str::to_string)
}

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
