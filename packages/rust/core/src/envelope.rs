//! Envelope assembly.
//!
//! [`EnvelopeBuilder`] takes a docname and rendered body plus whatever
//! fields the caller already knows, and derives the rest in a fixed order:
//!
//! 1. content id
//! 2. merged metadata
//! 3. asset offsets (rewrites the body)
//! 4. table of contents (over the rewritten body, injecting heading ids)
//! 5. title
//! 6. searchability
//! 7. edit URL (stored in metadata)
//!
//! A supplied field is never re-derived, so feeding a finished envelope
//! back through the builder reproduces it exactly.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use ramlpreparer_html::{HtmlDocument, first_text, parse_document, read_document, title_text};
use ramlpreparer_shared::{
    AssetOffset, Envelope, EnvelopeConfig, GITHUB_EDIT_URL_KEY, Metadata, PreparerError, Result,
    UNSEARCHABLE_KEY,
};

use crate::assets::map_assets;
use crate::edit_url::resolve_edit_url;
use crate::identity::derive_content_id;
use crate::meta::merge_meta;
use crate::toc::{extract_outline, inject_anchors, render_toc};

/// A built envelope plus the non-fatal problems met while deriving it.
#[derive(Debug)]
pub struct Assembled {
    pub envelope: Envelope,
    /// Unresolved assets and edit URL failures, in the order they occurred.
    pub warnings: Vec<PreparerError>,
}

/// Collects known envelope fields and derives the missing ones.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    docname: String,
    body: String,
    title: Option<String>,
    toc: Option<String>,
    unsearchable: Option<bool>,
    content_id: Option<String>,
    meta: Option<Metadata>,
    asset_offsets: Option<Vec<AssetOffset>>,
    addenda: Option<Value>,
    per_page_meta: Metadata,
    github_edit_url: Option<String>,
}

impl EnvelopeBuilder {
    /// Start from a docname and the inner markup of a rendered page.
    pub fn new(docname: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            docname: docname.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Start from a complete rendered page: body is the inner `<body>`
    /// markup and the page `<title>`, when present, is supplied as title.
    pub fn from_html_document(docname: impl Into<String>, html: &str) -> Self {
        Self::from_parts(docname, parse_document(html))
    }

    /// Like [`from_html_document`](Self::from_html_document), reading the
    /// page from disk.
    pub fn from_html_file(docname: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self::from_parts(docname, read_document(path)?))
    }

    fn from_parts(docname: impl Into<String>, doc: HtmlDocument) -> Self {
        let builder = Self::new(docname, doc.body);
        match doc.title {
            Some(title) => builder.title(title),
            None => builder,
        }
    }

    /// Seed a builder with every field of an existing envelope.
    pub fn from_envelope(envelope: Envelope) -> Self {
        Self {
            docname: envelope.docname,
            body: envelope.body,
            title: Some(envelope.title),
            toc: Some(envelope.toc),
            unsearchable: envelope.unsearchable,
            content_id: Some(envelope.content_id),
            meta: Some(envelope.meta),
            asset_offsets: Some(envelope.asset_offsets),
            addenda: envelope.addenda,
            per_page_meta: envelope.per_page_meta,
            github_edit_url: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn toc(mut self, toc: impl Into<String>) -> Self {
        self.toc = Some(toc.into());
        self
    }

    pub fn unsearchable(mut self, unsearchable: bool) -> Self {
        self.unsearchable = Some(unsearchable);
        self
    }

    pub fn content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Supply the already-merged metadata, skipping the merge.
    pub fn meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Supply the offset ledger. The body is then taken as already rewritten.
    pub fn asset_offsets(mut self, offsets: Vec<AssetOffset>) -> Self {
        self.asset_offsets = Some(offsets);
        self
    }

    pub fn addenda(mut self, addenda: Value) -> Self {
        self.addenda = Some(addenda);
        self
    }

    pub fn per_page_meta(mut self, per_page_meta: Metadata) -> Self {
        self.per_page_meta = per_page_meta;
        self
    }

    pub fn github_edit_url(mut self, url: impl Into<String>) -> Self {
        self.github_edit_url = Some(url.into());
        self
    }

    /// Derive every missing field and produce the envelope.
    ///
    /// Configuration problems and asset store failures are returned as
    /// errors. Unresolvable assets and edit links are collected in
    /// [`Assembled::warnings`] and the envelope is built without them.
    #[instrument(skip_all, fields(docname = %self.docname))]
    pub fn build(self, config: &(impl EnvelopeConfig + ?Sized)) -> Result<Assembled> {
        let mut warnings = Vec::new();

        let content_id = match self.content_id {
            Some(id) => id,
            None => derive_content_id(&self.docname, config)?,
        };

        let mut meta = match self.meta {
            Some(meta) => meta,
            None => merge_meta(config.meta(), &self.per_page_meta),
        };

        let (body, asset_offsets) = match self.asset_offsets {
            Some(offsets) => (self.body, offsets),
            None => {
                let (source, store) = asset_dirs(config)?;
                let mapping = map_assets(&self.body, source, store)?;
                warnings.extend(mapping.unresolved);
                (mapping.body, mapping.offsets)
            }
        };

        let (body, toc) = match self.toc {
            Some(toc) => (body, toc),
            None => {
                let outline = extract_outline(&body);
                let body = inject_anchors(&body, &outline);
                (body, render_toc(&outline))
            }
        };

        let title = match self.title {
            Some(title) => title,
            None => derive_title(&body, &self.docname),
        };

        let unsearchable = self
            .unsearchable
            .or_else(|| derive_unsearchable(&self.per_page_meta, config));

        if let Some(url) = self.github_edit_url {
            meta.insert(GITHUB_EDIT_URL_KEY.into(), Value::String(url));
        } else if !meta.contains_key(GITHUB_EDIT_URL_KEY) {
            match resolve_edit_url(&self.docname, config) {
                Ok(url) => {
                    meta.insert(GITHUB_EDIT_URL_KEY.into(), Value::String(url));
                }
                Err(err) if err.is_degradable() => {
                    warn!(error = %err, "envelope will have no edit URL");
                    warnings.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            %content_id,
            assets = asset_offsets.len(),
            warnings = warnings.len(),
            "envelope assembled"
        );

        Ok(Assembled {
            envelope: Envelope {
                body,
                docname: self.docname,
                title,
                toc,
                unsearchable,
                content_id,
                meta,
                asset_offsets,
                addenda: self.addenda,
                per_page_meta: self.per_page_meta,
            },
            warnings,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn asset_dirs(config: &(impl EnvelopeConfig + ?Sized)) -> Result<(&Path, &Path)> {
    let source = config
        .original_asset_dir()
        .ok_or_else(|| PreparerError::configuration("original_asset_dir is not set"))?;
    let store = config
        .asset_dir()
        .ok_or_else(|| PreparerError::configuration("asset_dir is not set"))?;
    Ok((source, store))
}

/// `<title>` text, else the first level-1 heading, else the docname.
fn derive_title(body: &str, docname: &str) -> String {
    title_text(body)
        .or_else(|| first_text(body, "h1"))
        .unwrap_or_else(|| docname.to_string())
}

/// A per-page `deconstunsearchable` flag wins over the repository default.
fn derive_unsearchable(
    per_page_meta: &Metadata,
    config: &(impl EnvelopeConfig + ?Sized),
) -> Option<bool> {
    match per_page_meta.get(UNSEARCHABLE_KEY) {
        Some(Value::Bool(flag)) => Some(*flag),
        Some(Value::String(flag)) => Some(flag == "true"),
        _ => config.default_unsearchable(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
