//! Search indexing
//!
//! Everything between an `Annotation` row and the document search engine:
//! the client seam, the presenter producing index documents, the transform
//! hook and the windowed `BatchIndexer`.

pub mod client;
pub mod elasticsearch;
pub mod events;
pub mod index;
pub mod memory;
pub mod presenter;

pub use client::{
    BulkAction, BulkItemError, BulkItemResult, Document, OpType, SearchClient, SearchError,
    SearchState,
};
pub use elasticsearch::ElasticsearchClient;
pub use events::{
    AnnotationTransformEvent, AnnotationTransformSubscriber, NipsaTransform, TransformSubscribers,
};
pub use index::{BatchIndexer, DEFAULT_WINDOW_SIZE, IndexerError};
pub use memory::InMemorySearchIndex;
pub use presenter::AnnotationSearchIndexPresenter;
