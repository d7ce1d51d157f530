//! "Edit this page" link resolution.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use ramlpreparer_shared::{EnvelopeConfig, PreparerError, Result, check_edit_link_pair};

/// Build the hosted edit URL for `docname`.
///
/// The source file is `git_root/<docname>` when that file exists. Otherwise
/// it is the first file (in sorted path order, `.git` skipped) beneath
/// `git_root` whose name equals the docname's basename. `github_url`,
/// `edit`, `github_branch` and the relative path are then joined with
/// single `/` separators.
///
/// Returns a configuration error when only one of `git_root` and
/// `github_url` is set, and an edit URL error when neither is set, the
/// branch is missing or blank, or no source file matches.
#[instrument(skip(config))]
pub fn resolve_edit_url(docname: &str, config: &(impl EnvelopeConfig + ?Sized)) -> Result<String> {
    check_edit_link_pair(config)?;

    let (Some(git_root), Some(github_url)) = (config.git_root(), non_blank(config.github_url()))
    else {
        return Err(PreparerError::edit_url(
            docname,
            "git_root and github_url are not configured",
        ));
    };
    let Some(branch) = non_blank(config.github_branch()) else {
        return Err(PreparerError::edit_url(docname, "github_branch is not configured"));
    };

    let relative = find_source(docname, git_root)?;
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let url = join_segments(&[github_url, "edit", branch, &relative]);
    debug!(%url, "resolved edit URL");
    Ok(url)
}

/// Path of the source file for `docname`, relative to `git_root`.
pub fn find_source(docname: &str, git_root: &Path) -> Result<PathBuf> {
    if let Some(exact) = exact_relative(docname).filter(|p| git_root.join(p).is_file()) {
        return Ok(exact);
    }

    let basename = Path::new(docname)
        .file_name()
        .ok_or_else(|| PreparerError::edit_url(docname, "docname has no file name"))?;

    let found = WalkDir::new(git_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry under git_root");
                None
            }
        })
        .find(|e| e.file_type().is_file() && e.file_name() == basename);

    let Some(entry) = found else {
        return Err(PreparerError::edit_url(
            docname,
            format!("no file named {basename:?} under {}", git_root.display()),
        ));
    };

    entry
        .path()
        .strip_prefix(git_root)
        .map(Path::to_path_buf)
        .map_err(|_| PreparerError::edit_url(docname, "matched file lies outside git_root"))
}

/// `docname` as a plain relative path, if it has no `..` or root parts.
fn exact_relative(docname: &str) -> Option<PathBuf> {
    let normalized = docname.replace('\\', "/");
    let path = Path::new(normalized.trim_start_matches('/'));
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().trim_matches('/').is_empty())
}

/// Join URL segments with exactly one `/` between them.
fn join_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .collect::<Vec<_>>()
        .join("/")
}
