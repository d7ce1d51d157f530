//! Reading rendered HTML documents.
//!
//! The renderer writes a complete HTML page. Envelopes carry only the inner
//! markup of `<body>`, with the page `<title>` lifted out separately. The
//! [`scan`] module holds the byte-accurate helpers the rewrite passes use.

pub mod scan;

use std::path::Path;

use scraper::{Html, Selector};
use tracing::{debug, instrument};

use ramlpreparer_shared::{PreparerError, Result};

/// A rendered page split into the parts an envelope needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    /// Whitespace-collapsed `<title>` text, if the page has a non-empty one.
    pub title: Option<String>,
    /// Inner markup of `<body>`.
    pub body: String,
}

/// Read and split a rendered HTML file.
///
/// A missing or empty file means the renderer failed.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_document(path: &Path) -> Result<HtmlDocument> {
    let html = std::fs::read_to_string(path).map_err(|e| PreparerError::io(path, e))?;
    if html.trim().is_empty() {
        return Err(PreparerError::Render(format!(
            "renderer produced an empty file at {}",
            path.display()
        )));
    }
    Ok(parse_document(&html))
}

/// Split an HTML page into title and body.
pub fn parse_document(html: &str) -> HtmlDocument {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .next()
                .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        })
        .filter(|t| !t.is_empty());

    let body = Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next().map(|b| b.inner_html()))
        .unwrap_or_else(|| html.to_string());

    debug!(title = ?title, body_len = body.len(), "split HTML document");

    HtmlDocument { title, body }
}

/// The `<title>` text of an HTML page or fragment, if any.
pub fn title_text(html: &str) -> Option<String> {
    parse_document(html).title
}

/// Text of the first element matching `selector` in an HTML fragment.
pub fn first_text(html: &str, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&sel)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Visible text of an HTML fragment, whitespace-collapsed.
pub fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse_whitespace(&fragment.root_element().text().collect::<String>())
}

/// Escape text for use in element content or a quoted attribute value.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_title_and_body() {
        let html = "<html><head><title>  Widgets\n API </title></head><body><h1>Widgets</h1><p>Hi</p></body></html>";
        let doc = parse_document(html);
        assert_eq!(doc.title.as_deref(), Some("Widgets API"));
        assert_eq!(doc.body, "<h1>Widgets</h1><p>Hi</p>");
    }

    #[test]
    fn empty_title_is_none() {
        let doc = parse_document("<html><head><title> </title></head><body></body></html>");
        assert_eq!(doc.title, None);
        assert_eq!(doc.body, "");
    }

    #[test]
    fn first_text_finds_heading() {
        let html = "<p>intro</p><h1>Main <em>Title</em></h1><h1>Second</h1>";
        assert_eq!(first_text(html, "h1").as_deref(), Some("Main Title"));
        assert_eq!(first_text(html, "h4"), None);
    }

    #[test]
    fn fragment_text_strips_markup() {
        assert_eq!(fragment_text("GET <code>/widgets</code>\n  list"), "GET /widgets list");
    }

    #[test]
    fn escape_special_characters() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn read_document_rejects_empty_file() {
        let path = std::env::temp_dir().join(format!("rp-html-empty-{}.html", uuid::Uuid::now_v7()));
        std::fs::write(&path, "  \n").unwrap();
        let err = read_document(&path).unwrap_err();
        assert!(matches!(err, PreparerError::Render(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_document_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("rp-html-missing-{}.html", uuid::Uuid::now_v7()));
        assert!(matches!(read_document(&path), Err(PreparerError::Io { .. })));
    }
}
