use serde_json::Value;
use std::{collections::HashSet, sync::Arc, time::Instant};
use thiserror::Error;

use super::{
    client::{BulkAction, BulkItemError, Document, OpType, SearchError, SearchState},
    events::{AnnotationTransformEvent, TransformSubscribers},
    presenter::AnnotationSearchIndexPresenter,
};
use crate::{models::Annotation, repository::RepositoryState};

/// Number of annotations fetched and submitted per bulk request.
pub const DEFAULT_WINDOW_SIZE: usize = 2000;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("failed to load annotations: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// BatchIndexer
///
/// Streams annotations from the repository into the search index, one
/// window at a time. Each window is presented, passed through the transform
/// subscribers and submitted as a single bulk request.
///
/// Failed items are collected and returned; nothing is retried.
pub struct BatchIndexer {
    repo: RepositoryState,
    search: SearchState,
    transforms: Arc<TransformSubscribers>,
    op_type: OpType,
}

impl BatchIndexer {
    pub fn new(
        repo: RepositoryState,
        search: SearchState,
        transforms: Arc<TransformSubscribers>,
    ) -> Self {
        Self {
            repo,
            search,
            transforms,
            op_type: OpType::Index,
        }
    }

    /// Uses `op_type` for every bulk action. With `OpType::Create`, documents
    /// that are already indexed are left alone and not reported as failures.
    pub fn with_op_type(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self
    }

    /// Indexes `ids`, or every non-deleted annotation when `ids` is `None` or
    /// empty, using [`DEFAULT_WINDOW_SIZE`].
    pub async fn index(&self, ids: Option<Vec<String>>) -> Result<HashSet<String>, IndexerError> {
        self.index_with_window(ids, DEFAULT_WINDOW_SIZE).await
    }

    /// index_with_window
    ///
    /// Returns the ids of the annotations the search engine failed to index.
    /// Soft-deleted annotations are skipped even when named in `ids`.
    ///
    /// Logs one progress line after every complete window.
    pub async fn index_with_window(
        &self,
        ids: Option<Vec<String>>,
        window_size: usize,
    ) -> Result<HashSet<String>, IndexerError> {
        let ids = match ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => self.repo.annotation_ids().await?,
        };
        let window_size = window_size.max(1);

        let started = Instant::now();
        let mut indexed = 0usize;
        let mut errored = HashSet::new();

        for window in ids.chunks(window_size) {
            let annotations = self.repo.annotations_by_ids(window).await?;
            let actions = annotations
                .iter()
                .map(|annotation| BulkAction {
                    op_type: self.op_type,
                    id: annotation.id.clone(),
                    document: present(&self.transforms, annotation),
                })
                .collect();

            for item in self.search.bulk(actions).await? {
                match item.outcome {
                    Ok(()) => {}
                    Err(BulkItemError::DocumentExists { .. }) if self.op_type == OpType::Create => {}
                    Err(error) => {
                        tracing::debug!("failed to index annotation {}: {}", item.id, error);
                        errored.insert(item.id);
                    }
                }
            }

            indexed += window.len();
            if window.len() == window_size {
                let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "indexed {}k annotations, rate={:.0}/s",
                    indexed / 1000,
                    indexed as f64 / elapsed
                );
            }
        }

        if !errored.is_empty() {
            tracing::warn!("{} annotations failed to index", errored.len());
        }
        Ok(errored)
    }
}

fn present(transforms: &TransformSubscribers, annotation: &Annotation) -> Document {
    let mut document = AnnotationSearchIndexPresenter::new(annotation).as_document();
    transforms.notify(&mut AnnotationTransformEvent {
        annotation,
        document: &mut document,
    });
    document
}

/// Indexes a single annotation, overwriting any existing document.
pub async fn index_annotation(
    search: &SearchState,
    transforms: &TransformSubscribers,
    annotation: &Annotation,
) -> Result<(), SearchError> {
    search
        .index_document(&annotation.id, present(transforms, annotation))
        .await
}

/// Marks the document of `annotation_id` as deleted.
///
/// The document stays in the index so that clients syncing from it can see
/// the deletion.
pub async fn delete(search: &SearchState, annotation_id: &str) -> Result<(), SearchError> {
    let mut document = Document::new();
    document.insert("deleted".into(), Value::Bool(true));
    search.index_document(annotation_id, document).await
}
