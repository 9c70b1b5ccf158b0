//! Cover resolution. A seed is a URL, a local path, or empty (derive from the fetched pages);
//! resolution happens once before packaging and loading happens at packaging time.

use crate::fetcher::{DumpDir, FetchError, Fetcher, PoliteClient};
use crate::image::ImageFormat;
use reqwest::Url;
use std::path::PathBuf;
use thiserror::Error;

/// Resolved pointer to the cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverReference {
    Remote(String),
    Local(PathBuf),
    /// Derivation found no image in the fetched pages.
    Absent,
}

/// Cover bytes ready to embed.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("Cover image not found: {path}")]
    MissingLocal { path: PathBuf },

    #[error("Cannot read cover image {path}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cover image could not be fetched from {url}")]
    Remote {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Could not derive a cover from the fetched pages")]
    Derive {
        #[source]
        source: FetchError,
    },

    #[error("Cover image is empty: {location}")]
    Empty { location: String },

    #[error("Cover reference is neither a URL nor a file path: {seed}")]
    Unsupported { seed: String },
}

/// True when `seed` starts with an HTTP(S) scheme.
pub fn is_remote(seed: &str) -> bool {
    let lower = seed.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Classify a non-empty reference. Local paths (plain or `file://`) must exist.
fn classify(seed: &str) -> Result<CoverReference, CoverError> {
    let seed = seed.trim();
    if is_remote(seed) {
        return Ok(CoverReference::Remote(seed.to_string()));
    }
    if seed.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
        return Err(CoverError::Unsupported {
            seed: seed.chars().take(40).collect(),
        });
    }
    let path = match Url::parse(seed) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(url.path())),
        _ => PathBuf::from(seed),
    };
    if !path.is_file() {
        return Err(CoverError::MissingLocal { path });
    }
    Ok(CoverReference::Local(path))
}

/// Resolve a cover seed. Empty or absent means "first image in the fetched pages", found by
/// the same fetcher in the same dump directory.
pub fn resolve_cover(
    seed: Option<&str>,
    dump: &DumpDir,
    fetcher: &dyn Fetcher,
) -> Result<CoverReference, CoverError> {
    let seed = seed.map(str::trim).unwrap_or_default();
    if !seed.is_empty() {
        return classify(seed);
    }
    match fetcher
        .first_image(dump)
        .map_err(|e| CoverError::Derive { source: e })?
    {
        Some(src) => {
            tracing::info!(src = %src, "Using first image of the work as cover");
            classify(&src)
        }
        None => {
            tracing::warn!("No cover given and no image found in the work; using a title-only cover page");
            Ok(CoverReference::Absent)
        }
    }
}

/// Load cover bytes. Remote covers are fetched through `client`; any failure is an error,
/// never a silent fallback.
pub fn load_cover(
    reference: &CoverReference,
    client: &mut PoliteClient,
) -> Result<Option<CoverImage>, CoverError> {
    match reference {
        CoverReference::Absent => Ok(None),
        CoverReference::Local(path) => {
            let data = std::fs::read(path).map_err(|e| CoverError::ReadLocal {
                path: path.clone(),
                source: e,
            })?;
            if data.is_empty() {
                return Err(CoverError::Empty {
                    location: path.display().to_string(),
                });
            }
            let format = ImageFormat::detect(&data, ImageFormat::from_path(path));
            Ok(Some(CoverImage { data, format }))
        }
        CoverReference::Remote(url) => {
            tracing::info!(url = %url, "Fetching cover image");
            let download = client
                .get_bytes(url, "cover image")
                .map_err(|e| CoverError::Remote {
                    url: url.clone(),
                    source: e,
                })?;
            if download.bytes.is_empty() {
                return Err(CoverError::Empty {
                    location: url.clone(),
                });
            }
            let hint = download
                .content_type
                .as_deref()
                .and_then(ImageFormat::from_content_type);
            let format = ImageFormat::detect(&download.bytes, hint);
            Ok(Some(CoverImage {
                data: download.bytes,
                format,
            }))
        }
    }
}
