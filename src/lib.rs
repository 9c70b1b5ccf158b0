//! lnscrape: download light novels from lightnovel.us, optionally convert between Chinese
//! character variants, and package them as EPUB.

pub mod assemble;
pub mod cli;
pub mod config;
pub mod convert;
pub mod cover;
pub mod epub;
pub mod fetcher;
pub mod image;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod prompt;

// Re-exports for CLI and consumers.
pub use convert::{Converter, VariantCode, ZhConverter};
pub use cover::CoverReference;
pub use epub::{write_epub, EpubError, EpubOptions, EpubVersion};
pub use fetcher::{resolve_site, FetchError, Fetcher, PoliteClient, PoliteClientBuilder, Site};
pub use model::{Content, Segment, Work, WorkMetadata};
pub use pipeline::{run, PipelineError, Request};
