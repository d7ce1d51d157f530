//! Asset reference rewriting.
//!
//! Local assets referenced from a rendered body are copied into a flat,
//! content-addressed store (`<sha256>.<ext>`) and the references are
//! rewritten to point at the stored objects. Every rewrite is recorded in
//! the offset ledger.
//!
//! Placement is safe under concurrent writers: an object is written to a
//! uniquely named temporary file and renamed into place, and an existing
//! object is never rewritten.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use url::Url;

use ramlpreparer_html::scan;
use ramlpreparer_shared::{AssetOffset, PreparerError, Result};

/// Element attributes that always point at an asset.
const ASSET_ATTRS: &[(&str, &str)] = &[
    ("img", "src"),
    ("source", "src"),
    ("video", "src"),
    ("video", "poster"),
    ("audio", "src"),
    ("embed", "src"),
    ("track", "src"),
    ("input", "src"),
    ("object", "data"),
];

/// Element attributes that point at an asset only for known file types.
const LINK_ATTRS: &[(&str, &str)] = &[("a", "href"), ("link", "href")];

/// Extensions treated as assets when they appear in a link target.
const LINKED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico", "pdf", "mp4", "webm", "ogg", "mp3",
    "wav", "zip", "gz", "tgz", "json", "raml", "yaml", "yml", "csv", "txt", "css",
];

/// Result of rewriting one body.
#[derive(Debug)]
pub struct AssetMapping {
    /// Body with every resolved reference rewritten.
    pub body: String,
    /// One entry per distinct rewritten reference, in first-occurrence order.
    pub offsets: Vec<AssetOffset>,
    /// References left untouched because the asset could not be read.
    pub unresolved: Vec<PreparerError>,
}

/// Rewrite local asset references in an HTML file on disk.
pub fn map_assets_in_file(
    html_path: &Path,
    original_asset_dir: &Path,
    asset_dir: &Path,
) -> Result<AssetMapping> {
    let body = std::fs::read_to_string(html_path).map_err(|e| PreparerError::io(html_path, e))?;
    map_assets(&body, original_asset_dir, asset_dir)
}

/// Rewrite local asset references in `body`.
///
/// References resolve beneath `original_asset_dir`. A reference whose file
/// is missing or unreadable is left as-is, gets no ledger entry, and is
/// reported in [`AssetMapping::unresolved`]. Only failures writing to the
/// store itself are returned as errors.
#[instrument(skip(body), fields(body_len = body.len(), source = %original_asset_dir.display(), store = %asset_dir.display()))]
pub fn map_assets(body: &str, original_asset_dir: &Path, asset_dir: &Path) -> Result<AssetMapping> {
    let references = find_references(body);
    if references.is_empty() {
        return Ok(AssetMapping {
            body: body.to_string(),
            offsets: Vec::new(),
            unresolved: Vec::new(),
        });
    }

    std::fs::create_dir_all(asset_dir).map_err(|e| PreparerError::io(asset_dir, e))?;

    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    let mut offsets = Vec::new();
    let mut unresolved = Vec::new();
    let mut edits = Vec::new();

    for (range, reference) in references {
        let rewritten = match resolved.get(&reference) {
            Some(known) => known.clone(),
            None => {
                let outcome = match store_asset(&reference, original_asset_dir, asset_dir)? {
                    Ok(address) => {
                        offsets.push(AssetOffset {
                            original: reference.clone(),
                            rewritten: address.clone(),
                        });
                        Some(address)
                    }
                    Err(err) => {
                        warn!(%reference, error = %err, "leaving asset reference unrewritten");
                        unresolved.push(err);
                        None
                    }
                };
                resolved.insert(reference.clone(), outcome.clone());
                outcome
            }
        };

        if let Some(address) = rewritten {
            edits.push((range, address));
        }
    }

    debug!(
        rewritten = offsets.len(),
        unresolved = unresolved.len(),
        "asset mapping complete"
    );

    Ok(AssetMapping {
        body: scan::splice(body, edits),
        offsets,
        unresolved,
    })
}

/// Whether `reference` already names an object in a content-addressed store.
pub fn is_store_address(reference: &str) -> bool {
    static ADDRESS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}(\.[a-z0-9]+)?$").expect("valid regex"));
    ADDRESS_RE.is_match(reference)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Byte ranges and raw values of every local asset reference, in document order.
fn find_references(body: &str) -> Vec<(Range<usize>, String)> {
    let tag_names: Vec<&str> = ASSET_ATTRS
        .iter()
        .chain(LINK_ATTRS)
        .map(|(tag, _)| *tag)
        .collect();

    let mut found = Vec::new();
    for tag in scan::open_tags(body, &tag_names) {
        for attr in &tag.attrs {
            let (Some(value), Some(range)) = (&attr.value, &attr.value_range) else {
                continue;
            };
            let always = ASSET_ATTRS.contains(&(tag.name.as_str(), attr.name.as_str()));
            let linked = LINK_ATTRS.contains(&(tag.name.as_str(), attr.name.as_str()));
            if !(always || linked) || !is_local(value) {
                continue;
            }
            if linked && !has_linked_extension(value) {
                continue;
            }
            found.push((range.clone(), value.clone()));
        }
    }
    found
}

fn is_local(reference: &str) -> bool {
    let reference = reference.trim();
    !(reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with("//")
        || Url::parse(reference).is_ok()
        || is_store_address(reference))
}

fn has_linked_extension(reference: &str) -> bool {
    Path::new(strip_suffixes(reference))
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| LINKED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Drop any query string or fragment.
fn strip_suffixes(reference: &str) -> &str {
    reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
}

/// Turn a raw reference into a path relative to the asset directory.
fn relative_asset_path(reference: &str) -> std::result::Result<PathBuf, String> {
    let decoded_entities = scan::decode_entities(reference.trim());
    let decoded = percent_decode_str(strip_suffixes(&decoded_entities))
        .decode_utf8()
        .map_err(|_| "reference is not valid UTF-8 after percent-decoding".to_string())?;

    let trimmed = decoded.trim_start_matches("./").trim_start_matches('/');
    let path = PathBuf::from(trimmed);
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err("reference escapes the asset directory".into());
    }
    if path.as_os_str().is_empty() {
        return Err("reference names no file".into());
    }
    Ok(path)
}

/// Copy one asset into the store.
///
/// The outer `Result` carries store failures, which abort the document.
/// The inner one carries resolution failures, which only skip the reference.
fn store_asset(
    reference: &str,
    original_asset_dir: &Path,
    asset_dir: &Path,
) -> Result<std::result::Result<String, PreparerError>> {
    let relative = match relative_asset_path(reference) {
        Ok(p) => p,
        Err(reason) => return Ok(Err(PreparerError::asset(reference, reason))),
    };
    let source = original_asset_dir.join(&relative);

    let bytes = match std::fs::read(&source) {
        Ok(b) => b,
        Err(e) => {
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                format!("{} does not exist", source.display())
            } else {
                format!("{} could not be read: {e}", source.display())
            };
            return Ok(Err(PreparerError::asset(reference, reason)));
        }
    };

    let address = content_address(&bytes, &relative);
    place(asset_dir, &address, &bytes)?;
    debug!(%reference, %address, "asset mapped");
    Ok(Ok(address))
}

fn content_address(bytes: &[u8], relative: &Path) -> String {
    let hash = format!("{:x}", Sha256::digest(bytes));
    match relative
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => format!("{hash}.{}", ext.to_ascii_lowercase()),
        None => hash,
    }
}

/// Write `bytes` to `asset_dir/address` unless an object is already there.
fn place(asset_dir: &Path, address: &str, bytes: &[u8]) -> Result<()> {
    let target = asset_dir.join(address);
    if target.exists() {
        return Ok(());
    }

    let temp = asset_dir.join(format!(".{address}.{}.tmp", uuid::Uuid::now_v7()));
    std::fs::write(&temp, bytes).map_err(|e| PreparerError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, &target) {
        let _ = std::fs::remove_file(&temp);
        // Another writer placed the same object first.
        if target.exists() {
            return Ok(());
        }
        return Err(PreparerError::io(&target, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;

    fn sha(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    fn setup() -> (PathBuf, PathBuf, PathBuf) {
        let root = temp_dir("assets");
        let source = root.join("src");
        let store = root.join("store");
        std::fs::create_dir_all(source.join("img")).unwrap();
        std::fs::write(source.join("img/x.png"), b"x-bytes").unwrap();
        std::fs::write(source.join("img/y.png"), b"y-bytes").unwrap();
        (root, source, store)
    }

    #[test]
    fn rewrites_present_assets() {
        let (root, source, store) = setup();
        let body = r#"<p><img src="img/x.png"> and <img src="img/y.png"></p>"#;

        let mapping = map_assets(body, &source, &store).unwrap();

        let x = format!("{}.png", sha(b"x-bytes"));
        let y = format!("{}.png", sha(b"y-bytes"));
        assert_eq!(
            mapping.body,
            format!(r#"<p><img src="{x}"> and <img src="{y}"></p>"#)
        );
        assert_eq!(
            mapping.offsets,
            vec![
                AssetOffset { original: "img/x.png".into(), rewritten: x.clone() },
                AssetOffset { original: "img/y.png".into(), rewritten: y.clone() },
            ]
        );
        assert!(mapping.unresolved.is_empty());
        assert!(store.join(&x).exists());
        assert!(store.join(&y).exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_asset_is_left_unrewritten() {
        let (root, source, store) = setup();
        std::fs::remove_file(source.join("img/y.png")).unwrap();
        let body = r#"<img src="img/x.png"><img src="img/y.png">"#;

        let mapping = map_assets(body, &source, &store).unwrap();

        assert_eq!(mapping.offsets.len(), 1);
        assert_eq!(mapping.offsets[0].original, "img/x.png");
        assert!(mapping.body.contains(r#"src="img/y.png""#));
        assert!(!mapping.body.contains(r#"src="img/x.png""#));
        assert_eq!(mapping.unresolved.len(), 1);
        assert!(matches!(
            &mapping.unresolved[0],
            PreparerError::AssetResolution { reference, .. } if reference == "img/y.png"
        ));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn ledger_matches_rewritten_body() {
        let (root, source, store) = setup();
        let body = r#"<img src="img/x.png"><a href="img/x.png">full size</a><img src='./img/y.png'>"#;

        let mapping = map_assets(body, &source, &store).unwrap();

        // One entry per distinct reference, every occurrence rewritten.
        assert_eq!(mapping.offsets.len(), 2);
        for offset in &mapping.offsets {
            assert!(!mapping.body.contains(&format!("\"{}\"", offset.original)));
            assert!(mapping.body.contains(&offset.rewritten));
            assert!(store.join(&offset.rewritten).exists());
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn ignores_remote_and_non_asset_references() {
        let (root, source, store) = setup();
        let body = r##"<img src="https://cdn.example.com/x.png"><img src="//cdn/x.png">
<img src="data:image/png;base64,AAAA"><a href="#methods">Methods</a><a href="other.html">Other</a>
<!-- <img src="img/x.png"> -->"##;

        let mapping = map_assets(body, &source, &store).unwrap();

        assert_eq!(mapping.body, body);
        assert!(mapping.offsets.is_empty());
        assert!(mapping.unresolved.is_empty());
        assert!(!store.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn escaping_reference_is_unresolved() {
        let (root, source, store) = setup();
        std::fs::write(root.join("secret.png"), b"nope").unwrap();

        let mapping = map_assets(r#"<img src="../secret.png">"#, &source, &store).unwrap();

        assert!(mapping.offsets.is_empty());
        assert_eq!(mapping.unresolved.len(), 1);
        assert!(mapping.unresolved[0].to_string().contains("escapes"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn percent_encoded_and_query_references_resolve() {
        let (root, source, store) = setup();
        std::fs::write(source.join("img/my pic.PNG"), b"pic").unwrap();

        let mapping = map_assets(r#"<img src="img/my%20pic.PNG?v=2">"#, &source, &store).unwrap();

        assert_eq!(mapping.offsets.len(), 1);
        assert_eq!(mapping.offsets[0].original, "img/my%20pic.PNG?v=2");
        assert_eq!(mapping.offsets[0].rewritten, format!("{}.png", sha(b"pic")));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn remapping_is_idempotent() {
        let (root, source, store) = setup();
        let body = r#"<img src="img/x.png">"#;

        let first = map_assets(body, &source, &store).unwrap();
        let again = map_assets(body, &source, &store).unwrap();
        assert_eq!(first.body, again.body);
        assert_eq!(first.offsets, again.offsets);

        // Already-rewritten bodies are left alone.
        let rerun = map_assets(&first.body, &source, &store).unwrap();
        assert_eq!(rerun.body, first.body);
        assert!(rerun.offsets.is_empty());
        assert!(rerun.unresolved.is_empty());

        // No temp files left behind.
        for entry in std::fs::read_dir(&store).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn concurrent_mappings_share_one_store() {
        let (root, source, store) = setup();
        let body = r#"<img src="img/x.png"><img src="img/y.png"><a href="img/x.png">x</a>"#;

        let results: Vec<AssetMapping> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| map_assets(body, &source, &store).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = &results[0];
        assert_eq!(first.offsets.len(), 2);
        for mapping in &results[1..] {
            assert_eq!(mapping.offsets, first.offsets);
            assert_eq!(mapping.body, first.body);
            assert!(mapping.unresolved.is_empty());
        }

        let mut names: Vec<String> = std::fs::read_dir(&store)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        let mut expected: Vec<String> = first.offsets.iter().map(|o| o.rewritten.clone()).collect();
        expected.sort();
        assert_eq!(names, expected);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn maps_file_on_disk() {
        let (root, source, store) = setup();
        let page = root.join("page.html");
        std::fs::write(&page, r#"<video poster="img/x.png"></video>"#).unwrap();

        let mapping = map_assets_in_file(&page, &source, &store).unwrap();
        assert_eq!(mapping.offsets.len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }
}
