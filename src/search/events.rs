use serde_json::Value;

use super::client::Document;
use crate::models::Annotation;

/// AnnotationTransformEvent
///
/// Raised once per annotation after it has been presented and before it is
/// written to the index. Subscribers may add or rewrite fields of `document`.
pub struct AnnotationTransformEvent<'a> {
    pub annotation: &'a Annotation,
    pub document: &'a mut Document,
}

pub trait AnnotationTransformSubscriber: Send + Sync {
    fn transform(&self, event: &mut AnnotationTransformEvent<'_>);
}

/// Marks documents of NIPSA'd users so searches can hide them.
pub struct NipsaTransform;

impl AnnotationTransformSubscriber for NipsaTransform {
    fn transform(&self, event: &mut AnnotationTransformEvent<'_>) {
        if event.annotation.user_nipsa {
            event.document.insert("nipsa".into(), Value::Bool(true));
        }
    }
}

/// TransformSubscribers
///
/// The registry notified for every `AnnotationTransformEvent`, in
/// registration order. The default registry carries [`NipsaTransform`].
pub struct TransformSubscribers {
    subscribers: Vec<Box<dyn AnnotationTransformSubscriber>>,
}

impl Default for TransformSubscribers {
    fn default() -> Self {
        Self::empty().with(NipsaTransform)
    }
}

impl TransformSubscribers {
    pub fn empty() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn with(mut self, subscriber: impl AnnotationTransformSubscriber + 'static) -> Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    pub fn notify(&self, event: &mut AnnotationTransformEvent<'_>) {
        for subscriber in &self.subscribers {
            subscriber.transform(event);
        }
    }
}
