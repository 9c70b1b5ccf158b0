//! Source fetchers. Site detection, the fetcher contract, the shared HTTP client, and the
//! lightnovel.us adapter.

mod client;
mod dump;
mod error;

pub mod html;
pub mod lightnovel;

pub use client::{Download, PoliteClient, PoliteClientBuilder};
pub use dump::DumpDir;
pub use error::FetchError;

use reqwest::Url;
use std::path::Path;

/// Supported source site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    LightNovel,
}

impl Site {
    pub fn name(self) -> &'static str {
        match self {
            Site::LightNovel => "lightnovel.us",
        }
    }
}

/// Options for one fetch: progress callback and an optional saved page to parse instead of
/// fetching the primary URL.
#[derive(Default)]
pub struct FetchOptions<'a> {
    pub progress: Option<&'a dyn Fn(u32, u32)>,
    /// HTML of the primary page, already read with [read_saved_page].
    pub saved_page: Option<String>,
}

/// Read a saved copy of the primary page. Done before the dump directory is prepared, since
/// the saved copy may itself be a page dumped by an earlier run.
pub fn read_saved_page(path: &Path) -> Result<String, FetchError> {
    std::fs::read_to_string(path).map_err(|e| FetchError::HtmlDump {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Contract every site adapter implements.
pub trait Fetcher {
    /// Fetch the work at `url`. Returns the raw contents: a string for a single text, or an
    /// array of `{"title", "content"}` objects for a chaptered work. Every fetched page is
    /// written to `dump`.
    fn fetch_contents(
        &mut self,
        url: &str,
        dump: &mut DumpDir,
        options: &FetchOptions<'_>,
    ) -> Result<serde_json::Value, FetchError>;

    /// Source of the first image in the pages dumped to `dump`, if any.
    fn first_image(&self, dump: &DumpDir) -> Result<Option<String>, FetchError>;
}

/// Resolve which site serves `url_input`. Unknown hosts, non-HTTP schemes and unrecognised
/// page paths are all UnsupportedSource.
pub fn resolve_site(url_input: &str) -> Result<Site, FetchError> {
    let url = Url::parse(url_input.trim()).map_err(|e| FetchError::InvalidUrl {
        input: url_input.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::UnsupportedSource {
            url: url_input.to_string(),
            reason: format!("scheme '{}' is not http or https", url.scheme()),
        });
    }
    let host = url.host_str().unwrap_or_default();
    if host == "lightnovel.us" || host.ends_with(".lightnovel.us") {
        lightnovel::PageKind::from_url(&url)?;
        return Ok(Site::LightNovel);
    }
    Err(FetchError::UnsupportedSource {
        url: url_input.to_string(),
        reason: format!("no fetcher for host '{}'", host),
    })
}

/// Build the adapter for `site`.
pub fn fetcher_for<'a>(site: Site, client: &'a mut PoliteClient) -> Box<dyn Fetcher + 'a> {
    match site {
        Site::LightNovel => Box::new(lightnovel::LightNovelFetcher::new(client)),
    }
}
