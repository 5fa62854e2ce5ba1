use async_trait::async_trait;
use reqwest::{StatusCode, Url, header::CONTENT_TYPE};
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::client::{
    BulkAction, BulkItemError, BulkItemResult, Document, OpType, SearchClient, SearchError,
};

/// Error `type` Elasticsearch reports when a `create` targets an existing id.
const VERSION_CONFLICT: &str = "version_conflict_engine_exception";
/// Error `type` returned when creating an index that is already there.
const INDEX_EXISTS: &str = "resource_already_exists_exception";

/// ElasticsearchClient
///
/// `SearchClient` over the Elasticsearch REST API: `_bulk` with NDJSON
/// bodies for batch writes, `_doc/{id}` for single documents.
///
/// Every request is bounded by `timeout`; an unresponsive cluster surfaces as
/// `SearchError::Http` instead of blocking the caller.
#[derive(Clone)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    base_url: Url,
    index: String,
}

impl ElasticsearchClient {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, SearchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SearchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SearchError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            index: index.to_string(),
        })
    }

    /// `base_url` extended by `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL of the document stored under `id`.
    pub fn doc_url(&self, id: &str) -> Url {
        self.url(&[self.index.as_str(), "_doc", id])
    }

    /// ensure_index
    ///
    /// Creates the annotation index with its field mapping. Calling it
    /// against an existing index is a no-op, so it is safe at every startup.
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        let response = self
            .http
            .put(self.url(&[self.index.as_str()]))
            .json(&index_mapping())
            .send()
            .await?;

        if response.status().is_success() {
            tracing::info!("created search index {}", self.index);
            return Ok(());
        }

        let status = response.status().as_u16();
        let body: Value = response.json().await?;
        if body["error"]["type"] == INDEX_EXISTS {
            tracing::debug!("search index {} already exists", self.index);
            return Ok(());
        }
        Err(SearchError::Status {
            status,
            body: body.to_string(),
        })
    }

    fn bulk_body(&self, actions: &[BulkAction]) -> Result<String, SearchError> {
        let mut body = String::new();
        for action in actions {
            let mut header = Map::new();
            header.insert(
                action.op_type.to_string(),
                json!({ "_index": self.index, "_id": action.id }),
            );
            body.push_str(&serde_json::to_string(&Value::Object(header))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&action.document)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    fn index_name(&self) -> &str {
        &self.index
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>, SearchError> {
        if actions.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .http
            .post(self.url(&["_bulk"]))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(self.bulk_body(&actions)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        parse_bulk_response(&body)
    }

    async fn index_document(&self, id: &str, document: Document) -> Result<(), SearchError> {
        let response = self.http.put(self.doc_url(id)).json(&document).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, SearchError> {
        let response = self.http.get(self.doc_url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        match body.get("_source") {
            Some(Value::Object(source)) => Ok(Some(source.clone())),
            _ => Err(SearchError::Malformed(format!("no _source for document {}", id))),
        }
    }
}

/// parse_bulk_response
///
/// Turns a `_bulk` response body into per-item results. Each entry of
/// `items` is keyed by its action type; failed items carry an `error` object
/// whose `type` drives the classification.
pub fn parse_bulk_response(body: &Value) -> Result<Vec<BulkItemResult>, SearchError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Malformed("bulk response has no items".to_string()))?;

    items.iter().map(parse_bulk_item).collect()
}

fn parse_bulk_item(item: &Value) -> Result<BulkItemResult, SearchError> {
    let (op_type, status) = if let Some(status) = item.get("create") {
        (OpType::Create, status)
    } else if let Some(status) = item.get("index") {
        (OpType::Index, status)
    } else {
        return Err(SearchError::Malformed(format!("unexpected bulk item: {}", item)));
    };

    let id = status
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::Malformed(format!("bulk item without _id: {}", item)))?;

    let Some(error) = status.get("error") else {
        return Ok(BulkItemResult::ok(op_type, id));
    };

    let http_status = status.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
    let error_type = error
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let reason = error
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());

    let error = if op_type == OpType::Create && error_type == VERSION_CONFLICT {
        BulkItemError::DocumentExists { reason }
    } else {
        BulkItemError::Rejected {
            status: http_status,
            error_type,
            reason,
        }
    };
    Ok(BulkItemResult::failed(op_type, id, error))
}

/// Field mapping of the annotation index.
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "created": { "type": "date" },
                "updated": { "type": "date" },
                "user": { "type": "keyword" },
                "user_raw": { "type": "keyword" },
                "authority": { "type": "keyword" },
                "text": { "type": "text" },
                "tags": { "type": "text" },
                "tags_raw": { "type": "keyword" },
                "group": { "type": "keyword" },
                "shared": { "type": "boolean" },
                "uri": { "type": "text" },
                "uri_normalized": { "type": "keyword" },
                "target": { "type": "object", "enabled": false },
                "references": { "type": "keyword" },
                "thread_ids": { "type": "keyword" },
                "nipsa": { "type": "boolean" },
                "deleted": { "type": "boolean" }
            }
        }
    })
}
