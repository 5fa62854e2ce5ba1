use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::client::{
    BulkAction, BulkItemError, BulkItemResult, Document, OpType, SearchClient, SearchError,
};

#[derive(Default)]
struct IndexState {
    documents: HashMap<String, Document>,
    scripted: VecDeque<Vec<BulkItemResult>>,
    bulk_requests: Vec<Vec<BulkAction>>,
}

/// InMemorySearchIndex
///
/// A `SearchClient` holding documents in a map. `index` overwrites, `create`
/// reports `DocumentExists` for ids already present, matching the engine.
///
/// Bulk responses can be scripted with [`InMemorySearchIndex::script_bulk`]:
/// the next bulk call returns the scripted items verbatim and writes nothing,
/// which is how tests simulate engine-side failures.
pub struct InMemorySearchIndex {
    index: String,
    state: Mutex<IndexState>,
}

impl Default for InMemorySearchIndex {
    fn default() -> Self {
        Self::new("annotations")
    }
}

impl InMemorySearchIndex {
    pub fn new(index: &str) -> Self {
        Self {
            index: index.to_string(),
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the results returned by the next bulk call.
    pub fn script_bulk(&self, results: Vec<BulkItemResult>) {
        self.state().scripted.push_back(results);
    }

    /// The actions of every bulk call received so far.
    pub fn bulk_requests(&self) -> Vec<Vec<BulkAction>> {
        self.state().bulk_requests.clone()
    }

    pub fn document(&self, id: &str) -> Option<Document> {
        self.state().documents.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchClient for InMemorySearchIndex {
    fn index_name(&self) -> &str {
        &self.index
    }

    async fn bulk(&self, actions: Vec<BulkAction>) -> Result<Vec<BulkItemResult>, SearchError> {
        let mut state = self.state();
        state.bulk_requests.push(actions.clone());

        if let Some(scripted) = state.scripted.pop_front() {
            return Ok(scripted);
        }

        let results = actions
            .into_iter()
            .map(|action| {
                if action.op_type == OpType::Create && state.documents.contains_key(&action.id) {
                    let reason = format!("[{}]: version conflict, document already exists", action.id);
                    return BulkItemResult::failed(
                        action.op_type,
                        action.id,
                        BulkItemError::DocumentExists { reason },
                    );
                }
                state.documents.insert(action.id.clone(), action.document);
                BulkItemResult::ok(action.op_type, action.id)
            })
            .collect();
        Ok(results)
    }

    async fn index_document(&self, id: &str, document: Document) -> Result<(), SearchError> {
        self.state().documents.insert(id.to_string(), document);
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, SearchError> {
        Ok(self.document(id))
    }
}
