//! Registry error model.

use thiserror::Error;

use crate::version::Version;

/// Result type used across the registry core.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registration/resolution failure.
///
/// Keep this focused on failures that must surface loudly. A missing route
/// is not an error anywhere in the core; it falls through to the not-found
/// handler chain instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// More than one distinct version was asserted for a single request
    /// (e.g. an explicit version disagreeing with a `v{n}` path segment).
    #[error("conflicting versions requested: {candidates:?}")]
    ConflictingVersions { candidates: Vec<Version> },
}

/// Input/output codec failure.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A request body could not be decoded as the negotiated content type.
    #[error("failed to decode body as {content_type}: {source}")]
    Decode {
        content_type: String,
        source: serde_json::Error,
    },

    /// A response value could not be encoded.
    #[error("failed to encode response body: {source}")]
    Encode { source: serde_json::Error },
}

/// CLI dispatch failure.
#[derive(Debug, Error)]
pub enum CliError {
    /// The argument vector carried no command name.
    #[error("no command given")]
    MissingCommand,

    /// The first argument did not name a registered command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The selected command ran and failed.
    #[error(transparent)]
    Command(#[from] anyhow::Error),
}
