//! Test doubles shared by the unit tests in this crate.

use std::path::{Path, PathBuf};

use ramlpreparer_shared::{EnvelopeConfig, Metadata};

/// Plain-field configuration double.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestConfig {
    pub envelope_dir: Option<PathBuf>,
    pub meta: Metadata,
    pub original_asset_dir: Option<PathBuf>,
    pub asset_dir: Option<PathBuf>,
    pub git_root: Option<PathBuf>,
    pub github_url: Option<String>,
    pub github_branch: Option<String>,
    pub content_id_base: Option<String>,
    pub default_unsearchable: Option<bool>,
}

impl TestConfig {
    pub fn new(content_id_base: &str) -> Self {
        Self {
            content_id_base: Some(content_id_base.into()),
            ..Self::default()
        }
    }

    /// A config whose directories all live under `root`.
    pub fn rooted(root: &Path) -> Self {
        Self {
            envelope_dir: Some(root.join("envelopes")),
            original_asset_dir: Some(root.join("src")),
            asset_dir: Some(root.join("store")),
            ..Self::new("https://github.com/org/widgets-api/")
        }
    }
}

impl EnvelopeConfig for TestConfig {
    fn envelope_dir(&self) -> Option<&Path> {
        self.envelope_dir.as_deref()
    }
    fn meta(&self) -> &Metadata {
        &self.meta
    }
    fn original_asset_dir(&self) -> Option<&Path> {
        self.original_asset_dir.as_deref()
    }
    fn asset_dir(&self) -> Option<&Path> {
        self.asset_dir.as_deref()
    }
    fn git_root(&self) -> Option<&Path> {
        self.git_root.as_deref()
    }
    fn github_url(&self) -> Option<&str> {
        self.github_url.as_deref()
    }
    fn github_branch(&self) -> Option<&str> {
        self.github_branch.as_deref()
    }
    fn content_id_base(&self) -> Option<&str> {
        self.content_id_base.as_deref()
    }
    fn default_unsearchable(&self) -> Option<bool> {
        self.default_unsearchable
    }
}

/// A fresh, empty directory under the system temp dir.
pub(crate) fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rp-{label}-test-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
