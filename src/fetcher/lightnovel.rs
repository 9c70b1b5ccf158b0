//! lightnovel.us adapter. An article page yields one text; a series page lists articles,
//! each fetched in turn and returned as a titled entry.

use crate::fetcher::html::{first_image_src, parse_selector, render_body};
use crate::fetcher::{DumpDir, FetchError, FetchOptions, Fetcher, PoliteClient};
use reqwest::Url;
use scraper::{ElementRef, Html};
use serde_json::{json, Value};

const SITE_BASE: &str = "https://www.lightnovel.us/";

/// Article body containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &["#article-main-contents", "article", ".article-content"];
const TITLE_SELECTORS: &[&str] = &["h2.article-title", ".article-title", "h1", "title"];
/// Containers holding a series' article list; the whole page is used when none match.
const SERIES_LIST_SELECTORS: &[&str] = &[".series-list", ".article-list", "#series-articles"];
/// Site name appended to page titles. Everything from the marker on is dropped.
const TITLE_SITE_MARKERS: &[&str] = &[" - 轻之国度", " | 轻之国度", " - 輕之國度", " - LightNovel"];

/// Page kinds this adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Article(u64),
    Series(u64),
}

impl PageKind {
    /// Detect the page kind from the path: `.../detail/<id>` or `.../series/<id>`.
    pub fn from_url(url: &Url) -> Result<Self, FetchError> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        for pair in segments.windows(2) {
            let Ok(id) = pair[1].parse::<u64>() else {
                continue;
            };
            match pair[0] {
                "detail" => return Ok(PageKind::Article(id)),
                "series" => return Ok(PageKind::Series(id)),
                _ => {}
            }
        }
        Err(FetchError::UnsupportedSource {
            url: url.to_string(),
            reason: "expected an article (/detail/<id>) or series (/series/<id>) page".to_string(),
        })
    }

    fn context(self) -> &'static str {
        match self {
            PageKind::Article(_) => "article page",
            PageKind::Series(_) => "series page",
        }
    }
}

/// Article parsed from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Article {
    title: Option<String>,
    body: String,
}

/// One entry of a series' article list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeriesLink {
    url: String,
    title: Option<String>,
}

pub struct LightNovelFetcher<'a> {
    client: &'a mut PoliteClient,
}

impl<'a> LightNovelFetcher<'a> {
    pub fn new(client: &'a mut PoliteClient) -> Self {
        Self { client }
    }
}

fn site_base() -> Result<Url, FetchError> {
    Url::parse(SITE_BASE).map_err(|e| FetchError::InvalidUrl {
        input: SITE_BASE.to_string(),
        reason: e.to_string(),
    })
}

/// Cut the site name off a page title.
fn strip_site_marker(title: &str) -> String {
    let mut t = title.trim();
    for marker in TITLE_SITE_MARKERS {
        if let Some(pos) = t.find(marker) {
            t = t[..pos].trim();
        }
    }
    t.to_string()
}

fn first_match<'d>(doc: &'d Html, selectors: &[&str], url: &str) -> Result<Option<ElementRef<'d>>, FetchError> {
    for sel in selectors {
        let selector = parse_selector(sel, url)?;
        if let Some(el) = doc.select(&selector).next() {
            return Ok(Some(el));
        }
    }
    Ok(None)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_article(html: &str, url: &str) -> Result<Article, FetchError> {
    let doc = Html::parse_document(html);
    let base = Url::parse(url).or_else(|_| site_base())?;
    let container = first_match(&doc, CONTENT_SELECTORS, url)?.ok_or_else(|| {
        FetchError::ParsePage {
            url: url.to_string(),
            message: "article body not found (page structure may have changed, or the article needs a login)".to_string(),
        }
    })?;
    let body = render_body(container, &base);
    if body.trim().is_empty() {
        return Err(FetchError::ParsePage {
            url: url.to_string(),
            message: "article body is empty".to_string(),
        });
    }
    let mut title = None;
    for sel in TITLE_SELECTORS {
        let selector = parse_selector(sel, url)?;
        let found = doc
            .select(&selector)
            .map(|el| strip_site_marker(&element_text(el)))
            .find(|t| !t.is_empty());
        if found.is_some() {
            title = found;
            break;
        }
    }
    Ok(Article { title, body })
}

fn parse_series(html: &str, url: &str) -> Result<Vec<SeriesLink>, FetchError> {
    let doc = Html::parse_document(html);
    let base = Url::parse(url).or_else(|_| site_base())?;
    let link_sel = parse_selector("a[href*=\"/detail/\"]", url)?;
    let list = first_match(&doc, SERIES_LIST_SELECTORS, url)?;
    let anchors: Vec<ElementRef<'_>> = match list {
        Some(container) => container.select(&link_sel).collect(),
        None => doc.select(&link_sel).collect(),
    };
    let mut links: Vec<SeriesLink> = Vec::new();
    for a in anchors {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(PageKind::from_url(&resolved), Ok(PageKind::Article(_))) {
            continue;
        }
        let resolved = resolved.to_string();
        if links.iter().any(|l| l.url == resolved) {
            continue;
        }
        let title = Some(element_text(a))
            .filter(|t| !t.is_empty())
            .or_else(|| a.value().attr("title").map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty());
        links.push(SeriesLink {
            url: resolved,
            title,
        });
    }
    Ok(links)
}

impl Fetcher for LightNovelFetcher<'_> {
    fn fetch_contents(
        &mut self,
        url: &str,
        dump: &mut DumpDir,
        options: &FetchOptions<'_>,
    ) -> Result<Value, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            input: url.to_string(),
            reason: e.to_string(),
        })?;
        let kind = PageKind::from_url(&parsed)?;
        let html = match &options.saved_page {
            Some(saved) => {
                tracing::info!(url = %url, "Parsing saved page instead of fetching");
                saved.clone()
            }
            None => {
                tracing::info!(url = %url, kind = kind.context(), "Fetching");
                self.client.get_text(url, kind.context())?
            }
        };
        dump.write_page(&html)?;

        let contents = match kind {
            PageKind::Article(_) => Value::String(parse_article(&html, url)?.body),
            PageKind::Series(_) => {
                let links = parse_series(&html, url)?;
                if links.is_empty() {
                    return Err(FetchError::EmptySeries {
                        url: url.to_string(),
                    });
                }
                tracing::info!(articles = links.len(), "Parsed series article list");
                let total = links.len() as u32;
                let mut entries = Vec::with_capacity(links.len());
                for (i, link) in links.into_iter().enumerate() {
                    let n = i as u32 + 1;
                    if let Some(progress) = options.progress {
                        progress(n, total);
                    }
                    let page = self
                        .client
                        .get_text(&link.url, &format!("series entry {}", n))?;
                    dump.write_page(&page)?;
                    let article = parse_article(&page, &link.url)?;
                    let title = link
                        .title
                        .or(article.title)
                        .unwrap_or_else(|| format!("Chapter {}", n));
                    entries.push(json!({ "title": title, "content": article.body }));
                }
                Value::Array(entries)
            }
        };
        dump.write_contents(&contents)?;
        Ok(contents)
    }

    fn first_image(&self, dump: &DumpDir) -> Result<Option<String>, FetchError> {
        let base = site_base()?;
        let body_sel = parse_selector("body", SITE_BASE)?;
        for page in dump.pages()? {
            let html = std::fs::read_to_string(&page).map_err(|e| FetchError::Dump {
                path: page.clone(),
                source: e,
            })?;
            let doc = Html::parse_document(&html);
            let scope = match first_match(&doc, CONTENT_SELECTORS, SITE_BASE)? {
                Some(container) => Some(container),
                None => doc.select(&body_sel).next(),
            };
            if let Some(src) = scope.and_then(|root| first_image_src(root, &base)) {
                tracing::debug!(page = %page.display(), src = %src, "Found first image");
                return Ok(Some(src));
            }
        }
        Ok(None)
    }
}
