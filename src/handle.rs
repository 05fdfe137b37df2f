use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The portable `{cursorId, sessionId}` pair.
///
/// This is the only state that has to survive transfer between connections or
/// processes. Both ids are carried as strings: the cursor id is a decimal
/// rendering of the server's 64-bit id, the session id is the 32-character hex
/// rendering of the 16-byte server session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorHandle {
    pub cursor_id: String,
    pub session_id: String,
}

impl CursorHandle {
    pub fn new(cursor_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            cursor_id: cursor_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Checks both fields are well formed. An invalid handle must never be
    /// used to fetch.
    pub fn validate(&self) -> Result<()> {
        self.cursor_id_i64()?;
        if self.session_id.len() != 32 || !self.session_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidHandle(format!(
                "sessionId must be a 32-character hex string, got {:?}",
                self.session_id
            )));
        }
        Ok(())
    }

    /// The cursor id as the 64-bit integer the getMore command requires.
    pub(crate) fn cursor_id_i64(&self) -> Result<i64> {
        let id: i64 = self.cursor_id.parse().map_err(|_| {
            Error::InvalidHandle(format!(
                "cursorId must be a decimal 64-bit integer, got {:?}",
                self.cursor_id
            ))
        })?;
        if id < 0 {
            return Err(Error::InvalidHandle(format!(
                "cursorId must be non-negative, got {id}"
            )));
        }
        Ok(id)
    }

    /// Serializes to the external JSON transfer form.
    pub fn to_json(&self) -> String {
        // Two plain string fields, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a handle back from its JSON transfer form and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let handle: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidHandle(format!("malformed handle JSON: {e}")))?;
        handle.validate()?;
        Ok(handle)
    }
}
