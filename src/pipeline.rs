//! Download pipeline: fetch, normalize, resolve cover, assemble, package. Each step runs
//! strictly after the previous one; any error aborts the run before an output file exists.

use crate::assemble::{assemble, package, AssemblyError, PackageError};
use crate::convert::{Converter, VariantCode};
use crate::cover::{resolve_cover, CoverError};
use crate::epub::{EpubError, EpubOptions};
use crate::fetcher::{
    fetcher_for, read_saved_page, resolve_site, DumpDir, FetchError, FetchOptions, Fetcher,
    PoliteClient,
};
use crate::model::{Work, WorkMetadata};
use crate::normalize::{normalize, NormalizeError};
use std::path::PathBuf;
use thiserror::Error;

/// Fully completed request. Built before the pipeline starts; nothing here is prompted for.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub dump_dir: PathBuf,
    pub html_dump: Option<PathBuf>,
    pub title: String,
    pub authors: Vec<String>,
    pub identifier: Option<String>,
    /// URL, local path, or empty/None to derive from the work's first image.
    pub cover_seed: Option<String>,
    pub convert: Option<VariantCode>,
    pub output_dir: PathBuf,
    pub epub: EpubOptions,
}

impl Request {
    fn metadata(&self) -> WorkMetadata {
        WorkMetadata {
            source: self.url.clone(),
            title: self.title.trim().to_string(),
            authors: self.authors.clone(),
            identifier: self
                .identifier
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Contents(#[from] NormalizeError),

    #[error(transparent)]
    Cover(#[from] CoverError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Package(#[from] EpubError),
}

impl From<PackageError> for PipelineError {
    fn from(e: PackageError) -> Self {
        match e {
            PackageError::Cover(e) => PipelineError::Cover(e),
            PackageError::Epub(e) => PipelineError::Package(e),
        }
    }
}

/// Fetch and normalize the work, resolve its cover, and assemble it.
pub fn acquire(
    request: &Request,
    fetcher: &mut dyn Fetcher,
    converter: &dyn Converter,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<Work, PipelineError> {
    let saved_page = request.html_dump.as_deref().map(read_saved_page).transpose()?;
    let mut dump = DumpDir::create(&request.dump_dir)?;
    let options = FetchOptions { progress, saved_page };
    let raw = fetcher.fetch_contents(&request.url, &mut dump, &options)?;
    let contents = normalize(raw, request.convert, converter)?;
    tracing::info!(sections = contents.section_count(), "Normalized contents");
    let cover = resolve_cover(request.cover_seed.as_deref(), &dump, fetcher)?;
    Ok(assemble(request.metadata(), contents, cover)?)
}

/// Package an assembled work into the request's output directory.
pub fn publish(
    work: Work,
    request: &Request,
    client: &mut PoliteClient,
) -> Result<PathBuf, PipelineError> {
    Ok(package(work, &request.output_dir, &request.epub, client)?)
}

/// Whole run for a request: site detection first, so an unsupported URL touches nothing.
pub fn run(
    request: &Request,
    client: &mut PoliteClient,
    converter: &dyn Converter,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<PathBuf, PipelineError> {
    let site = resolve_site(&request.url)?;
    tracing::info!(site = site.name(), url = %request.url, "Resolved source");
    let work = {
        let mut fetcher = fetcher_for(site, client);
        acquire(request, fetcher.as_mut(), converter, progress)?
    };
    publish(work, request, client)
}
