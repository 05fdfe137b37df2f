use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Namespace};

/// A configured, not-yet-executed find bound to a client.
///
/// This is what `initiate` introspects. The built state is kept as a raw
/// document in one of the layouts the extractors recognize: the fluent builder
/// below renders the newer named-field layout, while `from_state` accepts a
/// state document captured elsewhere (for instance from a different driver
/// generation) verbatim. No constructor or accessor performs any I/O.
#[derive(Debug, Clone)]
pub struct SourceCursor {
    client: Client,
    namespace: Namespace,
    state: Document,
}

impl SourceCursor {
    /// Wraps a raw cursor-state document as captured from a live cursor.
    pub fn from_state(client: Client, namespace: Namespace, state: Document) -> Self {
        Self {
            client,
            namespace,
            state,
        }
    }

    /// Starts a configured find in the named-field layout.
    pub fn find(client: Client, namespace: Namespace, filter: Document) -> Self {
        Self {
            client,
            namespace,
            state: doc! { "filter": filter },
        }
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.state.insert("sort", sort);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.state.insert("skip", skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.state.insert("limit", limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.state.insert("projection", projection);
        self
    }

    pub fn hint(mut self, hint: impl Into<Bson>) -> Self {
        self.state.insert("hint", hint.into());
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The raw built state, consumed read-only by introspection.
    pub fn state(&self) -> &Document {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::introspect;

    async fn unconnected_client() -> Client {
        // Never contacted; lazy client construction does no I/O.
        Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap()
    }

    fn test_namespace() -> Namespace {
        Namespace {
            db: "test".to_string(),
            coll: "articles".to_string(),
        }
    }

    #[tokio::test]
    async fn builder_renders_named_field_layout() {
        let source = SourceCursor::find(
            unconnected_client().await,
            test_namespace(),
            doc! { "index": { "$gte": 500 } },
        )
        .sort(doc! { "index": -1 })
        .skip(10)
        .limit(300)
        .projection(doc! { "index": 1 });

        let spec = introspect(source.state()).unwrap();
        assert_eq!(spec.filter, doc! { "index": { "$gte": 500 } });
        assert_eq!(spec.sort, Some(doc! { "index": -1 }));
        assert_eq!(spec.skip, Some(10));
        assert_eq!(spec.limit, Some(300));
        assert_eq!(spec.projection, Some(doc! { "index": 1 }));
    }

    #[tokio::test]
    async fn clone_leaves_original_untouched() {
        let source = SourceCursor::find(unconnected_client().await, test_namespace(), doc! {});
        let cloned = source.clone().limit(5);
        assert!(!source.state().contains_key("limit"));
        assert!(cloned.state().contains_key("limit"));
    }
}
