use mongodb::bson::{doc, Bson, Document};

use crate::error::{Error, Result};

/// The effective query of a configured find, frozen at handle-creation time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Document,
    pub hint: Option<Bson>,
    pub sort: Option<Document>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl QuerySpec {
    /// Renders the establishing `find` command. A batch size of zero opens and
    /// pins a server cursor without transmitting a first page.
    pub(crate) fn to_find_command(&self, collection: &str, batch_size: i64) -> Document {
        let mut cmd = doc! {
            "find": collection,
            "filter": self.filter.clone(),
            "batchSize": batch_size,
        };
        if let Some(hint) = &self.hint {
            cmd.insert("hint", hint.clone());
        }
        if let Some(sort) = &self.sort {
            cmd.insert("sort", sort.clone());
        }
        if let Some(skip) = self.skip {
            cmd.insert("skip", skip);
        }
        if let Some(limit) = self.limit {
            cmd.insert("limit", limit);
        }
        if let Some(projection) = &self.projection {
            cmd.insert("projection", projection.clone());
        }
        cmd
    }
}

/// One recognized internal layout of a driver cursor's built state.
///
/// `extract` returns `None` when the layout does not apply; yielding a filter
/// is what counts as a match. Adding support for a new driver generation means
/// adding an implementation here, not widening an existing one.
pub trait SpecExtractor {
    fn name(&self) -> &'static str;
    fn extract(&self, state: &Document) -> Option<QuerySpec>;
}

/// Newer cursor shape: filter and options stored as ordinary named fields.
pub struct NamedFieldExtractor;

impl SpecExtractor for NamedFieldExtractor {
    fn name(&self) -> &'static str {
        "named-field"
    }

    fn extract(&self, state: &Document) -> Option<QuerySpec> {
        let filter = state.get_document("filter").ok()?.clone();
        Some(QuerySpec {
            filter,
            hint: state.get("hint").cloned(),
            sort: state.get_document("sort").ok().cloned(),
            skip: bson_int(state, "skip"),
            limit: bson_int(state, "limit"),
            projection: state.get_document("projection").ok().cloned(),
        })
    }
}

/// Older cursor shape: private keyed state under `s`, with the built command
/// under `s.cmd` (filter keyed `query`, projection keyed `fields`).
pub struct KeyedStateExtractor;

impl SpecExtractor for KeyedStateExtractor {
    fn name(&self) -> &'static str {
        "keyed-state"
    }

    fn extract(&self, state: &Document) -> Option<QuerySpec> {
        let cmd = state.get_document("s").ok()?.get_document("cmd").ok()?;
        let filter = cmd.get_document("query").ok()?.clone();
        Some(QuerySpec {
            filter,
            hint: cmd.get("hint").cloned(),
            sort: cmd.get_document("sort").ok().cloned(),
            skip: bson_int(cmd, "skip"),
            limit: bson_int(cmd, "limit"),
            projection: cmd.get_document("fields").ok().cloned(),
        })
    }
}

/// Extracts the query spec from a raw cursor-state document, preferring the
/// newer named-field shape. Purely structural, no command is issued.
pub fn introspect(state: &Document) -> Result<QuerySpec> {
    let extractors: [&dyn SpecExtractor; 2] = [&NamedFieldExtractor, &KeyedStateExtractor];
    for extractor in extractors {
        if let Some(spec) = extractor.extract(state) {
            tracing::debug!(layout = extractor.name(), "extracted query spec");
            return Ok(spec);
        }
    }
    Err(Error::Introspection(
        "no extractor yielded a filter; unrecognized driver cursor layout".to_string(),
    ))
}

/// Reads an integer field regardless of its Int32/Int64 encoding.
pub(crate) fn bson_int(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key) {
        Some(Bson::Int32(n)) => Some(i64::from(*n)),
        Some(Bson::Int64(n)) => Some(*n),
        _ => None,
    }
}
