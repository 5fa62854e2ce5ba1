use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use thiserror::Error;
use utoipa::ToSchema;

/// A search index document: the field mapping stored under one id.
pub type Document = Map<String, Value>;

/// Bulk action type.
///
/// `Index` writes the document whether or not one already exists under the
/// id; `Create` refuses to overwrite, reporting the item as
/// [`BulkItemError::DocumentExists`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    #[default]
    Index,
    Create,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document write inside a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub op_type: OpType,
    pub id: String,
    pub document: Document,
}

/// Why a single bulk item failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BulkItemError {
    /// A `create` hit an id that is already indexed.
    #[error("document already exists: {reason}")]
    DocumentExists { reason: String },
    /// Anything else the engine rejected.
    #[error("{error_type} ({status}): {reason}")]
    Rejected {
        status: u16,
        error_type: String,
        reason: String,
    },
}

/// Per-item result of a bulk request, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemResult {
    pub op_type: OpType,
    pub id: String,
    pub outcome: Result<(), BulkItemError>,
}

impl BulkItemResult {
    pub fn ok(op_type: OpType, id: impl Into<String>) -> Self {
        Self {
            op_type,
            id: id.into(),
            outcome: Ok(()),
        }
    }

    pub fn failed(op_type: OpType, id: impl Into<String>, error: BulkItemError) -> Self {
        Self {
            op_type,
            id: id.into(),
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Request-level failures talking to the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search engine request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search engine returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed search engine response: {0}")]
    Malformed(String),
    #[error("invalid search engine url: {0}")]
    InvalidUrl(String),
    #[error("could not encode search document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// SearchClient
///
/// The document search engine as seen by the indexer. Implemented over HTTP
/// by `ElasticsearchClient` and in memory by `InMemorySearchIndex`.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Name of the index documents are written to.
    fn index_name(&self) -> &str;

    /// Submits all `actions` in one round trip. Item failures are reported in
    /// the returned results; only request-level failures are `Err`.
    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>, SearchError>;

    /// Writes `document` under `id`, replacing any existing document.
    async fn index_document(&self, id: &str, document: Document) -> Result<(), SearchError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, SearchError>;
}

/// SearchState
///
/// The concrete type used to share the search client across the application state.
pub type SearchState = Arc<dyn SearchClient>;
