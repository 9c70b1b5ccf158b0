//! Error type for source fetchers: URL and site detection, HTTP, page parsing, dump I/O.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported source: {url}: {reason}")]
    UnsupportedSource { url: String, reason: String },

    #[error("Failed to create HTTP client")]
    Client { source: reqwest::Error },

    #[error("Network error: could not reach {url}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "article page", "series entry 3") for programmatic use.
        context: Option<String>,
    },

    #[error("Failed to read response body from {url}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Could not parse page {url}: {message}")]
    ParsePage { url: String, message: String },

    #[error("Series page lists no articles: {url}")]
    EmptySeries { url: String },

    #[error("Cannot read HTML dump {path}")]
    HtmlDump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dump directory error: {path}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
