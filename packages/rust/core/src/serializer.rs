//! Envelope serialization.
//!
//! Each envelope is written as pretty-printed JSON to
//! `<envelope_dir>/<percent-encoded content_id>.json`. Writes replace the
//! whole file through a temporary sibling, so rebuilding a document simply
//! overwrites its previous envelope.

use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, instrument};

use ramlpreparer_shared::{Envelope, EnvelopeConfig, PreparerError, Result};

/// File extension of serialized envelopes.
pub const ENVELOPE_EXTENSION: &str = "json";

/// Everything except RFC 3986 unreserved characters is encoded, `/` included.
const CONTENT_ID_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// File name an envelope with `content_id` is stored under.
pub fn envelope_filename(content_id: &str) -> String {
    format!(
        "{}.{ENVELOPE_EXTENSION}",
        utf8_percent_encode(content_id, CONTENT_ID_ENCODE_SET)
    )
}

/// Full path at which `envelope` is serialized.
pub fn serialization_path(envelope_dir: &Path, envelope: &Envelope) -> PathBuf {
    envelope_dir.join(envelope_filename(&envelope.content_id))
}

/// Write `envelope` to `path`, or to its [`serialization_path`] under the
/// configured envelope directory when no path is given.
///
/// Returns the path written.
pub fn write(
    envelope: &Envelope,
    path: Option<&Path>,
    config: &(impl EnvelopeConfig + ?Sized),
) -> Result<PathBuf> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let dir = config
                .envelope_dir()
                .ok_or_else(|| PreparerError::configuration("envelope_dir is not set"))?;
            serialization_path(dir, envelope)
        }
    };
    write_envelope(envelope, &target)?;
    Ok(target)
}

/// Write `envelope` to exactly `path`, replacing any existing file.
#[instrument(skip(envelope), fields(content_id = %envelope.content_id, path = %path.display()))]
pub fn write_envelope(envelope: &Envelope, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(envelope)
        .map_err(|e| PreparerError::parse(format!("envelope serialization failed: {e}")))?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| PreparerError::serialization(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "envelope".into());
    let temp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    std::fs::write(&temp, json).map_err(|e| PreparerError::serialization(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(PreparerError::serialization(path, e));
    }

    debug!("wrote envelope");
    Ok(())
}

/// Read a previously serialized envelope.
pub fn read_envelope(path: &Path) -> Result<Envelope> {
    let content = std::fs::read_to_string(path).map_err(|e| PreparerError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| PreparerError::parse(format!("invalid envelope {}: {e}", path.display())))
}
