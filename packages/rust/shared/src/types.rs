//! Core domain types for content envelopes.

use serde::{Deserialize, Serialize};

/// String-keyed JSON mapping used for global and per-page metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Key under which the edit link is stored inside [`Envelope::meta`].
pub const GITHUB_EDIT_URL_KEY: &str = "github_edit_url";

/// Per-page metadata key that marks a page as excluded from search.
pub const UNSEARCHABLE_KEY: &str = "deconstunsearchable";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One document's rendered body plus everything derived from it, in the
/// shape the downstream content store ingests.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Rendered HTML body, with asset references rewritten.
    pub body: String,
    /// Basename of the source document.
    pub docname: String,
    /// Display title.
    pub title: String,
    /// Rendered navigation fragment.
    pub toc: String,
    /// Whether the page is hidden from search. `None` defers to the store.
    pub unsearchable: Option<bool>,
    /// Globally unique, URL-safe identifier.
    pub content_id: String,
    /// Global metadata merged with per-page overrides.
    pub meta: Metadata,
    /// Asset rewrites applied to `body`, in first-occurrence order.
    pub asset_offsets: Vec<AssetOffset>,
    /// Opaque pass-through payload.
    pub addenda: Option<serde_json::Value>,
    /// Metadata supplied for this page only.
    pub per_page_meta: Metadata,
}

impl Envelope {
    /// The hosted edit link, if one was resolved.
    pub fn github_edit_url(&self) -> Option<&str> {
        self.meta.get(GITHUB_EDIT_URL_KEY).and_then(|v| v.as_str())
    }
}

/// One rewritten asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOffset {
    /// Reference exactly as it appeared in the rendered body.
    pub original: String,
    /// Store-relative, content-addressed replacement.
    pub rewritten: String,
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// A heading in a document outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    /// Heading level, 1 through 6.
    pub level: u8,
    /// Visible heading text, whitespace-collapsed.
    pub text: String,
    /// Unique fragment identifier within the document.
    pub anchor: String,
    /// Headings nested beneath this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocNode>,
}

/// The heading tree of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Top-level headings.
    pub nodes: Vec<TocNode>,
}

impl Outline {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = &TocNode> {
        fn walk<'a>(nodes: &'a [TocNode], out: &mut Vec<&'a TocNode>) {
            for node in nodes {
                out.push(node);
                walk(&node.children, out);
            }
        }
        let mut flat = Vec::new();
        walk(&self.nodes, &mut flat);
        flat.into_iter()
    }
}
