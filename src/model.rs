//! Canonical data model for a downloaded work.
//!
//! The fetcher hands back an untyped value; the normalizer turns it into [Content] and
//! everything downstream (assembler, EPUB writer) works on these types only.

use crate::cover::CoverReference;
use serde::{Deserialize, Serialize};

/// Body of a work: one continuous text, or an ordered list of titled segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    Blob(String),
    Segments(Vec<Segment>),
}

impl Content {
    /// Number of sections the packaged document will have.
    pub fn section_count(&self) -> usize {
        match self {
            Content::Blob(_) => 1,
            Content::Segments(segments) => segments.len(),
        }
    }
}

/// One chapter or section of a chaptered work. Titles need not be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub title: String,
    pub text: String,
}

/// Identity of a work, as gathered before the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkMetadata {
    pub source: String,
    pub title: String,
    /// Possibly empty; order is the order given on input.
    pub authors: Vec<String>,
    pub identifier: Option<String>,
}

/// A fully assembled work, ready for packaging. Consumed once by [crate::assemble::package].
#[derive(Debug, Clone)]
pub struct Work {
    source: String,
    pub title: String,
    pub authors: Vec<String>,
    pub identifier: Option<String>,
    pub cover: CoverReference,
    pub contents: Content,
}

impl Work {
    pub(crate) fn new(metadata: WorkMetadata, contents: Content, cover: CoverReference) -> Self {
        Work {
            source: metadata.source,
            title: metadata.title,
            authors: metadata.authors,
            identifier: metadata.identifier,
            cover,
            contents,
        }
    }

    /// Origin URL. Fixed at construction.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Split a comma-delimited author list. Names are trimmed; empty names are dropped.
pub fn split_authors(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
