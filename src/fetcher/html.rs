//! HTML helpers shared by adapters: reducing an article body to minimal XHTML and locating
//! images.

use crate::epub::xml_escape;
use crate::fetcher::FetchError;
use reqwest::Url;
use scraper::node::{Element, Node};
use scraper::{ElementRef, Selector};

/// Elements that start a new paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "blockquote", "li", "ul", "ol", "h1", "h2", "h3", "h4",
    "h5", "h6", "pre", "table", "tr", "hr", "figure", "figcaption",
];

/// Elements dropped with their contents.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "iframe", "button"];

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
pub fn parse_selector(sel: &str, url: &str) -> Result<Selector, FetchError> {
    Selector::parse(sel).map_err(|e| FetchError::ParsePage {
        url: url.to_string(),
        message: format!("invalid selector {:?}: {}", sel, e),
    })
}

/// Image source of an `<img>`, resolved against `base`. Lazy-loading attributes are
/// checked after `src`; inline `data:` placeholders are never a source.
fn image_src(element: &Element, base: &Url) -> Option<String> {
    ["src", "data-src", "data-original"]
        .iter()
        .filter_map(|attr| element.attr(attr))
        .map(str::trim)
        .find(|s| !s.is_empty() && !is_inline_data(s))
        .and_then(|s| base.join(s).ok())
        .map(|u| u.to_string())
}

fn is_inline_data(src: &str) -> bool {
    src.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

/// First image under `root`, in document order.
pub fn first_image_src(root: ElementRef<'_>, base: &Url) -> Option<String> {
    root.descendants()
        .filter_map(|node| match node.value() {
            Node::Element(el) if el.name() == "img" => image_src(el, base),
            _ => None,
        })
        .next()
}

/// Reduce an article body to `<p>` paragraphs containing text, `<br/>` and `<img/>` only.
/// Attributes other than image sources are dropped.
pub fn render_body(root: ElementRef<'_>, base: &Url) -> String {
    let mut writer = BodyWriter {
        base,
        out: String::new(),
        line: String::new(),
    };
    writer.walk(root);
    writer.flush();
    writer.out
}

struct BodyWriter<'b> {
    base: &'b Url,
    out: String,
    line: String,
}

impl BodyWriter<'_> {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.line.push_str(&xml_escape(text)),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = el.name();
                    if SKIP_TAGS.contains(&name) {
                        continue;
                    }
                    match name {
                        "br" => self.line.push_str("<br/>"),
                        "img" => {
                            if let Some(src) = image_src(el, self.base) {
                                let alt = el.attr("alt").unwrap_or_default();
                                self.line.push_str(&format!(
                                    "<img src=\"{}\" alt=\"{}\"/>",
                                    xml_escape(&src),
                                    xml_escape(alt)
                                ));
                            }
                        }
                        _ if BLOCK_TAGS.contains(&name) => {
                            self.flush();
                            self.walk(child_ref);
                            self.flush();
                        }
                        _ => self.walk(child_ref),
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        let line = std::mem::take(&mut self.line);
        let mut para = line.trim();
        loop {
            let before = para.len();
            para = para
                .trim_start_matches("<br/>")
                .trim_end_matches("<br/>")
                .trim();
            if para.len() == before {
                break;
            }
        }
        if !para.is_empty() {
            self.out.push_str("<p>");
            self.out.push_str(para);
            self.out.push_str("</p>\n");
        }
    }
}
