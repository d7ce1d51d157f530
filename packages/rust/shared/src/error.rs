//! Error types for ramlpreparer.
//!
//! Library crates use [`PreparerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all envelope preparation operations.
#[derive(Debug, thiserror::Error)]
pub enum PreparerError {
    /// Required configuration is missing or malformed. Fatal for the whole run.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A referenced local asset could not be located or read. Non-fatal.
    #[error("asset {reference:?} could not be resolved: {reason}")]
    AssetResolution { reference: String, reason: String },

    /// The edit link for a document could not be built. Non-fatal.
    #[error("edit URL unavailable for {docname:?}: {reason}")]
    EditUrlResolution { docname: String, reason: String },

    /// The envelope output path is not writable.
    #[error("could not write envelope to {path:?}: {source}")]
    SerializationIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error outside of envelope serialization.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external renderer failed or produced no usable output.
    #[error("render error: {0}")]
    Render(String),

    /// A config or envelope file could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PreparerError>;

impl PreparerError {
    /// Create a configuration error from any displayable message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an asset resolution error for `reference`.
    pub fn asset(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssetResolution {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create an edit URL resolution error for `docname`.
    pub fn edit_url(docname: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EditUrlResolution {
            docname: docname.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `std::io::Error` raised while writing an envelope.
    pub fn serialization(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SerializationIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the enclosing document can still be produced after this error.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::AssetResolution { .. } | Self::EditUrlResolution { .. }
        )
    }
}
