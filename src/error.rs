use thiserror::Error;

/// Errors surfaced by cursor transfer.
///
/// Cursor exhaustion is deliberately absent: an expired or unknown cursor id on
/// a follow-up fetch is the normal end-of-sequence signal and is converted to
/// an empty page instead of an error.
#[derive(Debug, Error)]
pub enum Error {
    /// No known extractor recognized the source cursor's internal layout.
    #[error("could not extract a query spec from the source cursor: {0}")]
    Introspection(String),

    /// A database command failed for a reason other than cursor exhaustion.
    #[error(transparent)]
    Command(#[from] mongodb::error::Error),

    /// A cursor handle failed its validity rules and must not be used to fetch.
    #[error("invalid cursor handle: {0}")]
    InvalidHandle(String),

    /// A server reply was missing a field the protocol requires.
    #[error("unexpected server reply: {0}")]
    Reply(String),
}

pub type Result<T> = std::result::Result<T, Error>;
