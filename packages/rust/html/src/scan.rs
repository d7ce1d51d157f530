//! Byte-accurate markup scanning.
//!
//! The envelope passes rewrite attribute values in place, so they need the
//! exact byte ranges of tags and attributes in the original text, which a DOM
//! round-trip would lose. Comments, `<script>` and `<style>` blocks are
//! masked out and never reported.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// An opening tag found in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased element name.
    pub name: String,
    /// Byte range of the whole opening tag, `<` through `>`.
    pub range: Range<usize>,
    /// Attributes in source order.
    pub attrs: Vec<Attr>,
}

impl Tag {
    /// First attribute with the given (lowercase) name.
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

/// One attribute of a [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Lowercased attribute name.
    pub name: String,
    /// Raw value text without quotes, entities left encoded.
    pub value: Option<String>,
    /// Byte range of the raw value within the document.
    pub value_range: Option<Range<usize>>,
}

/// Byte ranges of comments, scripts and stylesheets.
pub fn masked_regions(html: &str) -> Vec<Range<usize>> {
    static MASK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<!--.*?(?:-->|\z)|<script\b.*?(?:</script\s*>|\z)|<style\b.*?(?:</style\s*>|\z)")
            .expect("valid regex")
    });

    MASK_RE.find_iter(html).map(|m| m.range()).collect()
}

/// Every opening tag whose name is in `names`, in document order.
pub fn open_tags(html: &str, names: &[&str]) -> Vec<Tag> {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)<([a-z][a-z0-9]*)\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
            .expect("valid regex")
    });

    let mut tags = Vec::new();
    for segment in unmasked_segments(html) {
        let text = &html[segment.clone()];
        for caps in TAG_RE.captures_iter(text) {
            let name = caps[1].to_ascii_lowercase();
            if !names.contains(&name.as_str()) {
                continue;
            }
            let whole = caps.get(0).expect("group 0 always matches");
            let attrs_match = caps.get(2).expect("attribute group always participates");
            tags.push(Tag {
                name,
                range: segment.start + whole.start()..segment.start + whole.end(),
                attrs: parse_attrs(attrs_match.as_str(), segment.start + attrs_match.start()),
            });
        }
    }
    tags
}

/// The closing tag for `name` that follows byte offset `from`, skipping
/// masked regions.
pub fn closing_tag(html: &str, name: &str, from: usize) -> Option<Range<usize>> {
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)</([a-z][a-z0-9]*)\s*>").expect("valid regex"));

    for segment in unmasked_segments(html) {
        if segment.end <= from {
            continue;
        }
        let start = segment.start.max(from);
        for caps in CLOSE_RE.captures_iter(&html[start..segment.end]) {
            if caps[1].eq_ignore_ascii_case(name) {
                let m = caps.get(0).expect("group 0 always matches");
                return Some(start + m.start()..start + m.end());
            }
        }
    }
    None
}

/// Apply non-overlapping replacements to `html`.
pub fn splice(html: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&html[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&html[cursor..]);
    out
}

/// Decode the handful of character references that show up in attribute
/// values: `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;` and numeric forms.
pub fn decode_entities(value: &str) -> String {
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos);").expect("valid regex")
    });

    ENTITY_RE
        .replace_all(value, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn parse_attrs(text: &str, offset: usize) -> Vec<Attr> {
    static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r#"(?i)([a-z_:][-a-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
        )
        .expect("valid regex")
    });

    ATTR_RE
        .captures_iter(text)
        .map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4));
            Attr {
                name: caps[1].to_ascii_lowercase(),
                value: value.map(|v| v.as_str().to_string()),
                value_range: value.map(|v| offset + v.start()..offset + v.end()),
            }
        })
        .collect()
}

fn unmasked_segments(html: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for masked in masked_regions(html) {
        if masked.start > cursor {
            segments.push(cursor..masked.start);
        }
        cursor = masked.end;
    }
    if cursor < html.len() {
        segments.push(cursor..html.len());
    }
    segments
}
