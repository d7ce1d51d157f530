//! TOC (Table of Contents) builder.
//!
//! Extracts the heading outline of a rendered body and renders it as a
//! nested `<ul>` navigation fragment.

use std::collections::HashSet;
use std::ops::Range;

use tracing::{debug, instrument};

use ramlpreparer_html::{escape, fragment_text, scan};
use ramlpreparer_shared::{Outline, TocNode};

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Anchor used when a heading's text has nothing to slug.
const FALLBACK_ANCHOR: &str = "section";

/// A heading as it appears in the source text.
#[derive(Debug)]
struct HeadingMatch {
    level: u8,
    name: String,
    open: Range<usize>,
    id_range: Option<Range<usize>>,
    existing_id: Option<String>,
    text: String,
}

/// Build the heading outline of `html`.
///
/// Each heading nests under the nearest preceding heading of a strictly
/// lower level; skipped levels add no intermediate nodes. Anchors reuse an
/// existing `id`, otherwise they are slugged from the heading text, and
/// collisions get a numeric suffix.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn extract_outline(html: &str) -> Outline {
    let headings = find_headings(html);
    let anchors = assign_anchors(&headings);

    let flat: Vec<TocNode> = headings
        .into_iter()
        .zip(anchors)
        .map(|(h, anchor)| TocNode {
            level: h.level,
            text: h.text,
            anchor,
            children: vec![],
        })
        .collect();

    let count = flat.len();
    let outline = Outline {
        nodes: build_tree(flat),
    };

    debug!(headings = count, roots = outline.nodes.len(), "outline extracted");
    outline
}

/// Render an outline as a nested list of fragment links.
///
/// An empty outline renders as an empty string.
pub fn render_toc(outline: &Outline) -> String {
    let mut out = String::new();
    if !outline.is_empty() {
        render_nodes(&outline.nodes, &mut out);
    }
    out
}

/// Give every heading in `html` the `id` its outline anchor names.
///
/// Headings whose `id` already matches are left untouched, so running this
/// over its own output changes nothing.
pub fn inject_anchors(html: &str, outline: &Outline) -> String {
    let headings = find_headings(html);
    let anchors: Vec<&str> = outline.iter().map(|n| n.anchor.as_str()).collect();
    if headings.len() != anchors.len() {
        debug!(
            headings = headings.len(),
            anchors = anchors.len(),
            "outline does not match markup, skipping anchor injection"
        );
        return html.to_string();
    }

    let edits = headings
        .iter()
        .zip(anchors)
        .filter(|(h, anchor)| h.existing_id.as_deref() != Some(*anchor))
        .map(|(h, anchor)| match &h.id_range {
            Some(range) => (range.clone(), escape(anchor)),
            None => {
                let at = h.open.start + 1 + h.name.len();
                (at..at, format!(" id=\"{}\"", escape(anchor)))
            }
        })
        .collect();

    scan::splice(html, edits)
}

/// Turn heading text into a fragment identifier.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push('_');
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_ANCHOR.to_string()
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_headings(html: &str) -> Vec<HeadingMatch> {
    scan::open_tags(html, HEADING_TAGS)
        .into_iter()
        .map(|tag| {
            let level = tag.name.as_bytes()[1] - b'0';
            let text = scan::closing_tag(html, &tag.name, tag.range.end)
                .map(|close| fragment_text(&html[tag.range.end..close.start]))
                .unwrap_or_default();
            let id = tag.attr("id");
            HeadingMatch {
                level,
                existing_id: id
                    .and_then(|a| a.value.as_deref())
                    .map(|v| scan::decode_entities(v).trim().to_string())
                    .filter(|v| !v.is_empty()),
                id_range: id.and_then(|a| a.value_range.clone()),
                open: tag.range,
                name: tag.name,
                text,
            }
        })
        .collect()
}

/// One unique anchor per heading, in document order.
fn assign_anchors(headings: &[HeadingMatch]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();

    // Existing ids keep their value on first use; later duplicates and
    // synthesized anchors are pushed off them.
    let mut claimed = vec![false; headings.len()];
    for (i, h) in headings.iter().enumerate() {
        if let Some(id) = &h.existing_id {
            claimed[i] = used.insert(id.clone());
        }
    }

    headings
        .iter()
        .zip(claimed)
        .map(|(h, claimed)| match (&h.existing_id, claimed) {
            (Some(id), true) => id.clone(),
            (Some(id), false) => disambiguate(id, &mut used),
            (None, _) => disambiguate(&slugify(&h.text), &mut used),
        })
        .collect()
}

fn disambiguate(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Nest a flat, document-ordered heading list.
fn build_tree(flat: Vec<TocNode>) -> Vec<TocNode> {
    let mut roots = Vec::new();
    // Open ancestors, strictly increasing in level from bottom to top.
    let mut stack: Vec<TocNode> = Vec::new();

    for node in flat {
        while stack.last().is_some_and(|top| top.level >= node.level) {
            if let Some(done) = stack.pop() {
                attach(&mut stack, &mut roots, done);
            }
        }
        stack.push(node);
    }
    while let Some(done) = stack.pop() {
        attach(&mut stack, &mut roots, done);
    }

    roots
}

fn attach(stack: &mut [TocNode], roots: &mut Vec<TocNode>, node: TocNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn render_nodes(nodes: &[TocNode], out: &mut String) {
    out.push_str("<ul>");
    for node in nodes {
        out.push_str("<li><a href=\"#");
        out.push_str(&escape(&node.anchor));
        out.push_str("\">");
        out.push_str(&escape(&node.text));
        out.push_str("</a>");
        if !node.children.is_empty() {
            render_nodes(&node.children, out);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
