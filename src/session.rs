use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, Binary, Bson, Document, Timestamp};
use mongodb::{Client, ClientSession};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Wire versions from this point on get the modern session representation.
const MODERN_SESSION_WIRE_VERSION: i64 = 9;

/// Which generation of the driver's session representation a connection gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionShape {
    Legacy,
    Modern,
}

/// A synthetic stand-in for a driver client session.
///
/// Stand-ins carry no authentication or transaction state; the server command
/// layer reads nothing but the identity document. Every other method on the
/// concrete shapes is a safe no-op.
pub trait SessionStandin {
    /// The session identity attached to outgoing commands as `lsid`.
    fn lsid(&self) -> Document;

    /// A synthetic session is never inside a transaction.
    fn in_transaction(&self) -> bool {
        false
    }
}

/// Builds the stand-in matching a previously resolved shape.
pub fn standin_for(shape: SessionShape, session_id: &str) -> Result<Box<dyn SessionStandin>> {
    Ok(match shape {
        SessionShape::Legacy => Box::new(LegacySession::new(session_id)?),
        SessionShape::Modern => Box::new(ModernSession::new(session_id)?),
    })
}

/// Minimal shape: identity plus the few inert fields older command layers read.
pub struct LegacySession {
    id: Binary,
}

impl LegacySession {
    pub fn new(session_id: &str) -> Result<Self> {
        Ok(Self {
            id: identity_binary(session_id)?,
        })
    }

    /// Transaction state transition hook; nothing ever transitions.
    pub fn transition(&self) {}

    pub fn supports_causal_consistency(&self) -> bool {
        false
    }
}

impl SessionStandin for LegacySession {
    fn lsid(&self) -> Document {
        doc! { "id": Bson::Binary(self.id.clone()) }
    }
}

/// Richer shape for newer command layers: lifecycle flags and an inert
/// transaction object on top of the identity.
pub struct ModernSession {
    id: Binary,
    has_ended: bool,
    explicit: bool,
    transaction: Transaction,
}

impl ModernSession {
    pub fn new(session_id: &str) -> Result<Self> {
        Ok(Self {
            id: identity_binary(session_id)?,
            has_ended: false,
            explicit: false,
            transaction: Transaction::default(),
        })
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn start_transaction(&mut self) {}

    pub fn commit_transaction(&mut self) {}

    pub fn abort_transaction(&mut self) {}

    /// The callback is never invoked; no transaction ever runs on a stand-in.
    pub fn with_transaction<F: FnOnce(&mut Self)>(&mut self, _func: F) {}

    pub fn advance_operation_time(&mut self, _to: Timestamp) {}

    pub fn advance_cluster_time(&mut self, _to: &Document) {}
}

impl SessionStandin for ModernSession {
    fn lsid(&self) -> Document {
        doc! { "id": Bson::Binary(self.id.clone()) }
    }
}

// A stand-in must never be written to the wire verbatim; only its identity
// document is meaningful.
impl Serialize for ModernSession {
    fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(
            "synthetic session is not serializable; attach lsid() instead",
        ))
    }
}

/// Inert transaction state carried by the modern shape.
#[derive(Debug, Default)]
pub struct Transaction {
    state: TransactionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    None,
}

impl Transaction {
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        false
    }

    pub fn is_starting(&self) -> bool {
        false
    }

    pub fn is_committed(&self) -> bool {
        false
    }

    pub fn is_pinned(&self) -> bool {
        false
    }
}

/// Picks the session shape for a connection with a single capability probe.
///
/// Any probing failure selects the legacy shape as the safe default. The
/// caller pins the result for the lifetime of the cursor it is building;
/// shapes are never mixed mid-sequence.
pub async fn detect_session_shape(client: &Client) -> SessionShape {
    let reply = client
        .database("admin")
        .run_command(doc! { "hello": 1 }, None)
        .await;
    let shape = match reply {
        Ok(reply) => match crate::spec::bson_int(&reply, "maxWireVersion") {
            Some(version) if version >= MODERN_SESSION_WIRE_VERSION => SessionShape::Modern,
            _ => SessionShape::Legacy,
        },
        Err(_) => SessionShape::Legacy,
    };
    tracing::debug!(?shape, "resolved session shape");
    shape
}

/// Reads the canonical 32-hex fingerprint off a real driver session.
pub(crate) fn session_fingerprint(session: &ClientSession) -> Result<String> {
    match session.id().get("id") {
        Some(Bson::Binary(binary)) => {
            let uuid = Uuid::from_slice(&binary.bytes).map_err(|_| {
                Error::Reply(format!(
                    "server session identity has {} bytes, expected 16",
                    binary.bytes.len()
                ))
            })?;
            Ok(uuid.simple().to_string())
        }
        _ => Err(Error::Reply(
            "server session reply carried no binary identity".to_string(),
        )),
    }
}

/// Decodes a 32-hex session fingerprint into the UUID-subtype binary the
/// server expects inside `lsid`.
fn identity_binary(session_id: &str) -> Result<Binary> {
    if session_id.len() != 32 {
        return Err(Error::InvalidHandle(format!(
            "sessionId must be a 32-character hex string, got {:?}",
            session_id
        )));
    }
    let uuid = Uuid::try_parse(session_id).map_err(|_| {
        Error::InvalidHandle(format!("sessionId is not valid hex: {:?}", session_id))
    })?;
    Ok(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: uuid.as_bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_ID: &str = "936da01f9abd4d9d80c702af85c822a8";

    #[test]
    fn lsid_is_a_uuid_subtype_binary() {
        let standin = standin_for(SessionShape::Legacy, SESSION_ID).unwrap();
        let lsid = standin.lsid();
        match lsid.get("id") {
            Some(Bson::Binary(binary)) => {
                assert_eq!(binary.subtype, BinarySubtype::Uuid);
                assert_eq!(binary.bytes.len(), 16);
                assert_eq!(binary.bytes[0], 0x93);
                assert_eq!(binary.bytes[15], 0xa8);
            }
            other => panic!("expected binary identity, got {:?}", other),
        }
    }

    #[test]
    fn both_shapes_render_the_same_identity() {
        let legacy = standin_for(SessionShape::Legacy, SESSION_ID).unwrap();
        let modern = standin_for(SessionShape::Modern, SESSION_ID).unwrap();
        assert_eq!(legacy.lsid(), modern.lsid());
    }

    #[test]
    fn legacy_shape_is_inert() {
        let session = LegacySession::new(SESSION_ID).unwrap();
        session.transition();
        assert!(!session.in_transaction());
        assert!(!session.supports_causal_consistency());
    }

    #[test]
    fn modern_shape_is_inert() {
        let mut session = ModernSession::new(SESSION_ID).unwrap();
        session.start_transaction();
        assert!(!session.transaction().is_active());
        assert!(!session.transaction().is_starting());
        session.commit_transaction();
        assert!(!session.transaction().is_committed());
        assert!(!session.transaction().is_pinned());
        assert_eq!(session.transaction().state(), TransactionState::None);
        session.abort_transaction();
        session.advance_operation_time(Timestamp {
            time: 1,
            increment: 1,
        });
        session.advance_cluster_time(&doc! {});
        let mut invoked = false;
        session.with_transaction(|_| invoked = true);
        assert!(!invoked);
        assert!(!session.has_ended());
        assert!(!session.is_explicit());
        assert!(!session.in_transaction());
    }

    #[test]
    fn modern_shape_refuses_serialization() {
        let session = ModernSession::new(SESSION_ID).unwrap();
        assert!(serde_json::to_string(&session).is_err());
    }

    #[test]
    fn rejects_malformed_session_id() {
        assert!(LegacySession::new("deadbeef").is_err());
        assert!(ModernSession::new("zz6da01f9abd4d9d80c702af85c822a8").is_err());
    }
}
