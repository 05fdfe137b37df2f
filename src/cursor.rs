use futures::stream::{self, Stream, TryStreamExt};
use mongodb::bson::{doc, Bson, Document};
use mongodb::Client;

use crate::error::{Error, Result};
use crate::handle::CursorHandle;
use crate::session::{self, SessionShape};
use crate::source::SourceCursor;
use crate::spec;

pub const DEFAULT_BATCH_SIZE: u32 = 20;

/// A cursor that can keep fetching pages from any connection, not just the one
/// it was opened on.
///
/// Created by [`initiate`](CrossCursor::initiate) from a configured find, or by
/// [`resume`](CrossCursor::resume) from a transferred [`CursorHandle`]. Holds a
/// cheap clone of the client handle; the connection's lifecycle stays with the
/// caller. Dropping the cursor issues no server-side cleanup, the server's own
/// cursor idle-timeout reaps it.
pub struct CrossCursor {
    handle: CursorHandle,
    client: Client,
    namespace: String,
    collection: String,
    batch_size: u32,
    shape: SessionShape,
    exhausted: bool,
}

impl CrossCursor {
    /// Opens a transferable cursor for the given source find.
    ///
    /// The source is cloned and left untouched. A transient driver session is
    /// opened and immediately dropped purely to mint a session fingerprint;
    /// the query then runs with `batchSize: 0` under a synthetic session
    /// carrying that fingerprint, so the server pins a cursor without sending
    /// a first page. Command failures propagate unmodified.
    pub async fn initiate(source: &SourceCursor) -> Result<CrossCursor> {
        let source = source.clone();
        let client = source.client().clone();
        let db = client.database(&source.namespace().db);

        // Transient session: never used for a command, only for its identity.
        let transient = client.start_session(None).await?;
        let session_id = session::session_fingerprint(&transient)?;
        drop(transient);

        let shape = session::detect_session_shape(&client).await;
        let query = spec::introspect(source.state())?;

        let standin = session::standin_for(shape, &session_id)?;
        let mut cmd = query.to_find_command(&source.namespace().coll, 0);
        cmd.insert("lsid", standin.lsid());
        let reply = db.run_command(cmd, None).await?;

        let cursor_doc = reply
            .get_document("cursor")
            .map_err(|_| Error::Reply("find reply carried no cursor document".to_string()))?;
        let cursor_id = cursor_doc
            .get_i64("id")
            .map_err(|_| Error::Reply("find reply carried no 64-bit cursor id".to_string()))?;
        let collection = cursor_doc
            .get_str("ns")
            .ok()
            .and_then(collection_from_ns)
            .unwrap_or(source.namespace().coll.as_str())
            .to_string();

        tracing::debug!(cursor_id, %collection, "opened transferable cursor");

        Ok(CrossCursor {
            handle: CursorHandle::new(cursor_id.to_string(), session_id),
            client,
            namespace: source.namespace().db.clone(),
            collection,
            batch_size: DEFAULT_BATCH_SIZE,
            shape,
            exhausted: false,
        })
    }

    /// Rebuilds a cursor from a transferred handle on an arbitrary connection.
    ///
    /// The handle is validated first; the session shape is probed once here
    /// and pinned for this instance, exactly as in `initiate`.
    pub async fn resume(
        handle: CursorHandle,
        client: Client,
        namespace: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<CrossCursor> {
        handle.validate()?;
        let shape = session::detect_session_shape(&client).await;
        Ok(CrossCursor {
            handle,
            client,
            namespace: namespace.into(),
            collection: collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            shape,
            exhausted: false,
        })
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn handle(&self) -> &CursorHandle {
        &self.handle
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn session_shape(&self) -> SessionShape {
        self.shape
    }

    /// Fetches the next page of documents, possibly empty.
    ///
    /// The synthetic session is rebuilt on every call from the shape pinned at
    /// construction. A failure indicating the cursor id is unknown or expired
    /// is the normal end-of-sequence signal and yields an empty page; every
    /// other failure propagates. After exhaustion, no further command is
    /// issued.
    pub async fn next(&mut self) -> Result<Vec<Document>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let standin = session::standin_for(self.shape, &self.handle.session_id)?;
        let mut cmd = doc! {
            "getMore": self.handle.cursor_id_i64()?,
            "collection": &self.collection,
            "batchSize": i64::from(self.batch_size),
        };
        cmd.insert("lsid", standin.lsid());

        let db = self.client.database(&self.namespace);
        let reply = match db.run_command(cmd, None).await {
            Ok(reply) => reply,
            Err(err) if cursor_gone(&err.to_string()) => {
                tracing::debug!(cursor_id = %self.handle.cursor_id, "cursor exhausted");
                self.exhausted = true;
                return Ok(Vec::new());
            }
            Err(err) => return Err(Error::Command(err)),
        };

        let cursor_doc = reply
            .get_document("cursor")
            .map_err(|_| Error::Reply("getMore reply carried no cursor document".to_string()))?;
        // Cursor id 0 means the server already closed the cursor.
        if matches!(cursor_doc.get_i64("id"), Ok(0)) {
            self.exhausted = true;
        }
        let batch = cursor_doc
            .get_array("nextBatch")
            .map_err(|_| Error::Reply("getMore reply carried no nextBatch".to_string()))?;

        let mut page = Vec::with_capacity(batch.len());
        for entry in batch {
            match entry {
                Bson::Document(doc) => page.push(doc.clone()),
                other => {
                    return Err(Error::Reply(format!(
                        "nextBatch entry is not a document: {:?}",
                        other.element_type()
                    )))
                }
            }
        }
        tracing::trace!(page = page.len(), "fetched page");
        Ok(page)
    }

    /// A lazy, finite, non-restartable sequence of the remaining documents.
    ///
    /// Repeatedly fetches pages and stops at the first empty one. Server
    /// return order is preserved; at most one page is buffered. Consumes the
    /// cursor, which also serializes the underlying getMore commands.
    pub fn iterate(self) -> impl Stream<Item = Result<Document>> {
        stream::try_unfold(self, |mut cursor| async move {
            let page = cursor.next().await?;
            if page.is_empty() {
                Ok::<_, Error>(None)
            } else {
                Ok(Some((
                    stream::iter(page.into_iter().map(Ok::<_, Error>)),
                    cursor,
                )))
            }
        })
        .try_flatten()
    }
}

/// Whether a getMore failure means the cursor is gone rather than the command
/// being at fault.
// TODO: match on server error code 43 (CursorNotFound) once run_command
// failures expose it structurally here; message matching is locale- and
// version-sensitive.
fn cursor_gone(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("cursor")
        && (message.contains("not found")
            || message.contains("expired")
            || message.contains("killed")
            || message.contains("exhausted"))
}

fn collection_from_ns(ns: &str) -> Option<&str> {
    ns.splitn(2, '.').nth(1).filter(|coll| !coll.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_cursor_not_found_messages() {
        assert!(cursor_gone(
            "Command failed (CursorNotFound): cursor id 8427385747105818487 not found"
        ));
        assert!(cursor_gone("Cursor has expired"));
        assert!(cursor_gone("operation was interrupted because the cursor was killed"));
        assert!(cursor_gone("cursor already exhausted"));
    }

    #[test]
    fn other_failures_are_not_exhaustion() {
        assert!(!cursor_gone("unknown top level operator: $gta"));
        assert!(!cursor_gone("not authorized on test to execute command"));
        assert!(!cursor_gone("connection refused"));
        // "not found" alone is not enough without a cursor mention
        assert!(!cursor_gone("ns not found"));
    }

    #[test]
    fn parses_collection_out_of_namespace() {
        assert_eq!(collection_from_ns("test.articles"), Some("articles"));
        assert_eq!(collection_from_ns("test.system.buckets.a"), Some("system.buckets.a"));
        assert_eq!(collection_from_ns("test"), None);
        assert_eq!(collection_from_ns("test."), None);
    }
}
