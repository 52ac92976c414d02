//! Error types for the session core.
//!
//! Two layers: [`ProtocolError`] covers session-level failures
//! (construction, outbound validation, fatal aborts) and
//! [`LineParseError`] covers wire-line decoding.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level session errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The [`LocalUser`](crate::session::LocalUser) is already bound
    /// to another session.
    #[error("local user is already bound to another session")]
    UserAlreadyBound,

    /// An outbound line contained a CR or LF byte.
    #[error("outbound line contains line terminator: {0:?}")]
    EmbeddedNewline(String),

    /// Failed to parse an inbound IRC line.
    #[error("invalid line: {string}")]
    InvalidLine {
        /// The raw line.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: LineParseError,
    },

    /// An identifier re-key produced two equal keys.
    #[error("case mapping change collided on {0:?}")]
    CaseMappingCollision(String),
}

/// Errors encountered when parsing wire lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineParseError {
    /// Line was empty (or all whitespace).
    #[error("empty line")]
    EmptyLine,

    /// Command was missing or contained invalid characters.
    #[error("invalid command")]
    InvalidCommand,

    /// A tag key was empty.
    #[error("empty tag key")]
    EmptyTagKey,
}
