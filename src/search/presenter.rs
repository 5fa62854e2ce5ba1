use serde_json::{Value, json};

use super::client::Document;
use crate::models::Annotation;

/// AnnotationSearchIndexPresenter
///
/// Serializes an annotation into the field mapping stored in the search
/// index. `user` and `tags` are lowercased for case-insensitive matching,
/// with the original values kept in `user_raw` and `tags_raw`.
pub struct AnnotationSearchIndexPresenter<'a> {
    annotation: &'a Annotation,
}

impl<'a> AnnotationSearchIndexPresenter<'a> {
    pub fn new(annotation: &'a Annotation) -> Self {
        Self { annotation }
    }

    pub fn as_document(&self) -> Document {
        let annotation = self.annotation;

        let mut document = Document::new();
        document.insert("id".into(), json!(annotation.id));
        document.insert("created".into(), json!(annotation.created_at.to_rfc3339()));
        document.insert("updated".into(), json!(annotation.updated_at.to_rfc3339()));
        document.insert("user".into(), json!(annotation.userid.to_lowercase()));
        document.insert("user_raw".into(), json!(annotation.userid));
        document.insert("authority".into(), json!(annotation.authority()));
        document.insert("text".into(), json!(annotation.text.as_deref().unwrap_or("")));
        document.insert(
            "tags".into(),
            json!(
                annotation
                    .tags
                    .iter()
                    .map(|tag| tag.to_lowercase())
                    .collect::<Vec<_>>()
            ),
        );
        document.insert("tags_raw".into(), json!(annotation.tags));
        document.insert("group".into(), json!(annotation.groupid));
        document.insert("shared".into(), json!(annotation.shared));
        document.insert("uri".into(), json!(annotation.target_uri));
        document.insert(
            "uri_normalized".into(),
            json!(normalize_uri(&annotation.target_uri)),
        );
        document.insert(
            "target".into(),
            json!([{
                "source": annotation.target_uri,
                "selector": annotation.target_selectors.0.clone(),
            }]),
        );
        document.insert("references".into(), json!(annotation.references));

        let thread_ids: Vec<Value> = annotation
            .thread_root_id()
            .map(|root| vec![json!(root)])
            .unwrap_or_default();
        document.insert("thread_ids".into(), Value::Array(thread_ids));

        document
    }
}

/// Lowercases scheme and host, drops the fragment and any trailing slash.
fn normalize_uri(uri: &str) -> String {
    let uri = uri.split('#').next().unwrap_or(uri);
    let normalized = match uri.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(i) => rest.split_at(i),
                None => (rest, ""),
            };
            format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), path)
        }
        None => uri.to_string(),
    };
    normalized.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uri_lowercases_host_and_drops_fragment() {
        assert_eq!(
            normalize_uri("HTTP://Example.COM/Path/#section"),
            "http://example.com/Path"
        );
        assert_eq!(normalize_uri("urn:x-pdf:abc"), "urn:x-pdf:abc");
    }

    #[test]
    fn thread_ids_hold_the_thread_root() {
        let annotation = Annotation {
            references: vec!["root".into(), "parent".into()],
            ..Annotation::default()
        };
        let document = AnnotationSearchIndexPresenter::new(&annotation).as_document();
        assert_eq!(document["thread_ids"], json!(["root"]));
        assert_eq!(document["references"], json!(["root", "parent"]));
    }

    #[test]
    fn user_and_tags_are_lowercased_with_raw_copies() {
        let annotation = Annotation {
            userid: "acct:Alice@Example.com".into(),
            tags: vec!["Rust".into()],
            ..Annotation::default()
        };
        let document = AnnotationSearchIndexPresenter::new(&annotation).as_document();
        assert_eq!(document["user"], json!("acct:alice@example.com"));
        assert_eq!(document["user_raw"], json!("acct:Alice@Example.com"));
        assert_eq!(document["tags"], json!(["rust"]));
        assert_eq!(document["tags_raw"], json!(["Rust"]));
        assert_eq!(document["authority"], json!("Example.com"));
    }
}
