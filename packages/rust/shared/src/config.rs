//! Configuration for ramlpreparer.
//!
//! User config lives at `~/.ramlpreparer/ramlpreparer.toml`. Values are
//! layered: config file, then the content repository's `_deconst.json`,
//! then environment variables, then CLI flags.
//!
//! The envelope subsystem never reads [`PreparerConfig`] directly. It goes
//! through the [`EnvelopeConfig`] capability trait so tests can hand it a
//! double instead.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PreparerError, Result};
use crate::types::Metadata;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ramlpreparer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ramlpreparer";

/// Repository-level settings file written by content authors.
pub const DECONST_JSON: &str = "_deconst.json";

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Named accessors for every setting the envelope subsystem consumes.
pub trait EnvelopeConfig: Send + Sync {
    /// Directory that receives serialized envelopes.
    fn envelope_dir(&self) -> Option<&Path>;
    /// Repository-global metadata defaults.
    fn meta(&self) -> &Metadata;
    /// Directory that local asset references are resolved against.
    fn original_asset_dir(&self) -> Option<&Path>;
    /// Content-addressed destination store for assets.
    fn asset_dir(&self) -> Option<&Path>;
    /// Root of the source repository checkout.
    fn git_root(&self) -> Option<&Path>;
    /// Hosted repository URL, e.g. `https://github.com/org/repo`.
    fn github_url(&self) -> Option<&str>;
    /// Branch that edit links point at.
    fn github_branch(&self) -> Option<&str>;
    /// Prefix every content identifier is derived from.
    fn content_id_base(&self) -> Option<&str>;
    /// Searchability used when a page does not say otherwise.
    fn default_unsearchable(&self) -> Option<bool> {
        None
    }
}

/// Check that the settings required before any document is processed are
/// present and consistent.
pub fn validate(config: &(impl EnvelopeConfig + ?Sized)) -> Result<()> {
    if config.envelope_dir().is_none() {
        return Err(PreparerError::configuration("envelope_dir is not set"));
    }
    match config.content_id_base() {
        Some(base) if !base.trim().is_empty() => {}
        _ => return Err(PreparerError::configuration("content_id_base is not set")),
    }
    if config.original_asset_dir().is_none() {
        return Err(PreparerError::configuration(
            "original_asset_dir is not set",
        ));
    }
    if config.asset_dir().is_none() {
        return Err(PreparerError::configuration("asset_dir is not set"));
    }
    check_edit_link_pair(config)?;
    if let Some(github_url) = config.github_url() {
        Url::parse(github_url).map_err(|e| {
            PreparerError::configuration(format!("github_url {github_url:?} is not a URL: {e}"))
        })?;
    }
    Ok(())
}

/// `git_root` and `github_url` only make sense together.
pub fn check_edit_link_pair(config: &(impl EnvelopeConfig + ?Sized)) -> Result<()> {
    match (config.git_root(), config.github_url()) {
        (Some(_), None) => Err(PreparerError::configuration(
            "git_root is set but github_url is not; set both or neither",
        )),
        (None, Some(_)) => Err(PreparerError::configuration(
            "github_url is set but git_root is not; set both or neither",
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Config structs (matching ramlpreparer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparerConfig {
    /// Envelope output settings.
    #[serde(default)]
    pub envelope: EnvelopeSection,

    /// Asset source and destination directories.
    #[serde(default)]
    pub assets: AssetsSection,

    /// Edit link settings.
    #[serde(default)]
    pub git: GitSection,

    /// External renderer settings.
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Batch run settings.
    #[serde(default)]
    pub batch: BatchSection,

    /// Global metadata merged into every envelope.
    #[serde(default)]
    pub meta: Metadata,
}

/// `[envelope]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeSection {
    /// Output directory for serialized envelopes.
    pub envelope_dir: Option<PathBuf>,
    /// Prefix for content identifiers.
    pub content_id_base: Option<String>,
    /// Repository-wide searchability default.
    pub default_unsearchable: Option<bool>,
}

/// `[assets]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsSection {
    /// Where referenced assets live in the source checkout.
    pub original_asset_dir: Option<PathBuf>,
    /// Content-addressed output store.
    pub asset_dir: Option<PathBuf>,
}

/// `[git]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitSection {
    pub git_root: Option<PathBuf>,
    pub github_url: Option<String>,
    pub github_branch: Option<String>,
}

/// `[renderer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Renderer executable.
    #[serde(default = "default_renderer_command")]
    pub command: String,

    /// Command run by `ramlpreparer setup` when the renderer is missing.
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_renderer_command(),
            install_command: default_install_command(),
        }
    }
}

fn default_renderer_command() -> String {
    "raml2html".into()
}
fn default_install_command() -> Vec<String> {
    vec![
        "npm".into(),
        "install".into(),
        "-g".into(),
        "raml2html".into(),
    ]
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Maximum documents processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}

impl EnvelopeConfig for PreparerConfig {
    fn envelope_dir(&self) -> Option<&Path> {
        self.envelope.envelope_dir.as_deref()
    }
    fn meta(&self) -> &Metadata {
        &self.meta
    }
    fn original_asset_dir(&self) -> Option<&Path> {
        self.assets.original_asset_dir.as_deref()
    }
    fn asset_dir(&self) -> Option<&Path> {
        self.assets.asset_dir.as_deref()
    }
    fn git_root(&self) -> Option<&Path> {
        self.git.git_root.as_deref()
    }
    fn github_url(&self) -> Option<&str> {
        self.git.github_url.as_deref()
    }
    fn github_branch(&self) -> Option<&str> {
        self.git.github_branch.as_deref()
    }
    fn content_id_base(&self) -> Option<&str> {
        self.envelope.content_id_base.as_deref()
    }
    fn default_unsearchable(&self) -> Option<bool> {
        self.envelope.default_unsearchable
    }
}

// ---------------------------------------------------------------------------
// Layering
// ---------------------------------------------------------------------------

/// The subset of `_deconst.json` this tool understands.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeconstJson {
    #[serde(rename = "contentIDBase")]
    content_id_base: Option<String>,
    github_url: Option<String>,
    github_branch: Option<String>,
    #[serde(default)]
    meta: Metadata,
}

impl PreparerConfig {
    /// Overlay settings from `<repo_root>/_deconst.json` if the file exists.
    /// Returns whether a file was applied.
    pub fn apply_deconst_json(&mut self, repo_root: &Path) -> Result<bool> {
        let path = repo_root.join(DECONST_JSON);
        if !path.exists() {
            tracing::debug!(?path, "no _deconst.json found");
            return Ok(false);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| PreparerError::io(&path, e))?;
        let deconst: DeconstJson = serde_json::from_str(&content).map_err(|e| {
            PreparerError::parse(format!("failed to parse {}: {e}", path.display()))
        })?;

        if deconst.content_id_base.is_some() {
            self.envelope.content_id_base = deconst.content_id_base;
        }
        if deconst.github_url.is_some() {
            self.git.github_url = deconst.github_url;
        }
        if deconst.github_branch.is_some() {
            self.git.github_branch = deconst.github_branch;
        }
        for (key, value) in deconst.meta {
            self.meta.insert(key, value);
        }

        tracing::debug!(?path, "applied _deconst.json");
        Ok(true)
    }

    /// Overlay settings from environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("ENVELOPE_DIR") {
            self.envelope.envelope_dir = Some(v.into());
        }
        if let Some(v) = non_empty("CONTENT_ID_BASE") {
            self.envelope.content_id_base = Some(v);
        }
        if let Some(v) = non_empty("ORIGINAL_ASSET_DIR") {
            self.assets.original_asset_dir = Some(v.into());
        }
        if let Some(v) = non_empty("ASSET_DIR") {
            self.assets.asset_dir = Some(v.into());
        }
        if let Some(v) = non_empty("GIT_ROOT") {
            self.git.git_root = Some(v.into());
        }
        if let Some(v) = non_empty("GITHUB_URL") {
            self.git.github_url = Some(v);
        }
        if let Some(v) = non_empty("GITHUB_BRANCH") {
            self.git.github_branch = Some(v);
        }
    }

    /// Overlay settings from the process environment.
    pub fn apply_env_vars(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ramlpreparer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PreparerError::configuration("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ramlpreparer/ramlpreparer.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<PreparerConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(PreparerConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<PreparerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PreparerError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PreparerError::configuration(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PreparerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&PreparerConfig::default())
        .map_err(|e| PreparerError::configuration(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PreparerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
