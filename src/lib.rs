//! Resume a MongoDB query cursor on a different connection or process.
//!
//! The driver binds a server-side cursor to one client's in-memory session
//! state, so a cursor normally dies with its connection. This crate opens the
//! query with an explicit `batchSize: 0` fetch under a synthetic session,
//! yielding a durable `{cursorId, sessionId}` pair that any connection can use
//! to keep paging:
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use mongodb::{bson::doc, Client, Namespace};
//! use mongo_cross_cursor::{CrossCursor, CursorHandle, SourceCursor};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let ns: Namespace = "test.articles".parse()?;
//!
//! let source = SourceCursor::find(client.clone(), ns, doc! {})
//!     .sort(doc! { "index": -1 });
//! let cursor = CrossCursor::initiate(&source).await?;
//!
//! // The handle is the only state that has to cross the process boundary.
//! let json = cursor.handle().to_json();
//!
//! // ...elsewhere, on an independent connection:
//! let other = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let handle = CursorHandle::from_json(&json)?;
//! let resumed = CrossCursor::resume(handle, other, "test", "articles").await?;
//! let docs: Vec<_> = resumed.iterate().try_collect().await?;
//! # Ok(())
//! # }
//! ```

mod cursor;
mod error;
mod handle;
pub mod session;
pub mod spec;
mod source;

pub use cursor::{CrossCursor, DEFAULT_BATCH_SIZE};
pub use error::{Error, Result};
pub use handle::CursorHandle;
pub use session::SessionShape;
pub use source::SourceCursor;
pub use spec::QuerySpec;
