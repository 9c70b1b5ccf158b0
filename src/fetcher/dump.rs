//! Dump directory: raw pages and contents written during a fetch, for offline debugging.
//!
//! Pages are numbered in fetch order (`page-1.html`, `page-2.html`, ...). Cover derivation
//! reads them back in the same order.

use crate::fetcher::FetchError;
use std::path::{Path, PathBuf};

const PAGE_PREFIX: &str = "page-";
const PAGE_SUFFIX: &str = ".html";
const CONTENTS_FILE: &str = "contents.json";

#[derive(Debug)]
pub struct DumpDir {
    path: PathBuf,
    next_page: u32,
}

impl DumpDir {
    /// Create the directory (and parents) if needed. Pages left by an earlier run are
    /// removed so derivation only sees this run's pages.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| FetchError::Dump {
            path: path.clone(),
            source: e,
        })?;
        let dump = DumpDir { path, next_page: 1 };
        for stale in dump.pages()? {
            std::fs::remove_file(&stale).map_err(|e| FetchError::Dump {
                path: stale.clone(),
                source: e,
            })?;
        }
        Ok(dump)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one fetched page; returns its path.
    pub fn write_page(&mut self, html: &str) -> Result<PathBuf, FetchError> {
        let file = self
            .path
            .join(format!("{}{}{}", PAGE_PREFIX, self.next_page, PAGE_SUFFIX));
        std::fs::write(&file, html).map_err(|e| FetchError::Dump {
            path: file.clone(),
            source: e,
        })?;
        self.next_page += 1;
        tracing::debug!(path = %file.display(), bytes = html.len(), "Dumped page");
        Ok(file)
    }

    /// Write the raw contents value as pretty JSON.
    pub fn write_contents(&self, contents: &serde_json::Value) -> Result<PathBuf, FetchError> {
        let file = self.path.join(CONTENTS_FILE);
        serde_json::to_string_pretty(contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|s| std::fs::write(&file, s))
            .map_err(|e| FetchError::Dump {
                path: file.clone(),
                source: e,
            })?;
        Ok(file)
    }

    /// Dumped pages in fetch order.
    pub fn pages(&self) -> Result<Vec<PathBuf>, FetchError> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| FetchError::Dump {
            path: self.path.clone(),
            source: e,
        })?;
        let mut pages: Vec<(u32, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FetchError::Dump {
                path: self.path.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let Some(n) = name.to_str().and_then(page_number) else {
                continue;
            };
            pages.push((n, entry.path()));
        }
        pages.sort_by_key(|(n, _)| *n);
        Ok(pages.into_iter().map(|(_, p)| p).collect())
    }
}

fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_suffix(PAGE_SUFFIX)?
        .parse()
        .ok()
}
