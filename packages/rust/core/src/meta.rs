//! Global and per-page metadata merging.

use ramlpreparer_shared::Metadata;

/// Merge per-page metadata over the repository-global defaults.
///
/// Returns a fresh mapping; neither input is touched.
pub fn merge_meta(global: &Metadata, per_page: &Metadata) -> Metadata {
    let mut merged = global.clone();
    for (key, value) in per_page {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
