//! Work assembler. [assemble] validates metadata and builds the in-memory [Work] without I/O;
//! [package] loads the cover, embeds illustrations and hands a [Document] to the EPUB writer.

use crate::cover::{load_cover, CoverError, CoverReference};
use crate::epub::{write_epub, xml_escape, Document, EmbeddedImage, EpubError, EpubOptions, Section};
use crate::fetcher::{Download, FetchError, PoliteClient};
use crate::image::ImageFormat;
use crate::model::{Content, Work, WorkMetadata};
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest file stem, in characters, derived from a title.
const MAX_FILE_STEM_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Cannot assemble work: title is missing.")]
    MissingTitle,

    #[error("Cannot assemble work: source URL is missing.")]
    MissingSource,
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    Cover(#[from] CoverError),

    #[error(transparent)]
    Epub(#[from] EpubError),
}

/// Build a work from complete metadata, normalized content and a resolved cover.
pub fn assemble(
    metadata: WorkMetadata,
    contents: Content,
    cover: CoverReference,
) -> Result<Work, AssemblyError> {
    if metadata.source.trim().is_empty() {
        return Err(AssemblyError::MissingSource);
    }
    if metadata.title.trim().is_empty() {
        return Err(AssemblyError::MissingTitle);
    }
    Ok(Work::new(metadata, contents, cover))
}

/// Output file for a title: `<output_dir>/<sanitized title>.epub`.
pub fn output_path(title: &str, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.epub", sanitize_title(title)))
}

/// Safe file stem from a title: letters and digits kept (ASCII lowercased), everything else
/// becomes `-`, runs collapsed, ends trimmed. Falls back to `book`.
fn sanitize_title(title: &str) -> String {
    let mut s = String::with_capacity(title.len());
    for c in title.chars() {
        let c = if c.is_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if c == '-' && s.ends_with('-') {
            continue;
        }
        s.push(c);
    }
    let s: String = s.trim_matches('-').chars().take(MAX_FILE_STEM_CHARS).collect();
    let s = s.trim_end_matches('-');
    if s.is_empty() {
        "book".to_string()
    } else {
        s.to_string()
    }
}

/// Section body as XHTML. Text that already carries markup is used as-is; plain text is
/// escaped and split into paragraphs at line breaks.
fn body_xhtml(text: &str) -> String {
    if has_markup(text) {
        return text.to_string();
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| format!("<p>{}</p>\n", xml_escape(l)))
        .collect()
}

/// True when `text` contains at least one real element, not just stray `<` characters.
fn has_markup(text: &str) -> bool {
    if !text.contains('<') {
        return false;
    }
    Html::parse_fragment(text)
        .root_element()
        .descendants()
        .skip(1)
        .any(|node| node.value().is_element())
}

/// One section per entry; a blob becomes a single section titled after the work.
fn sections_for(work: &Work) -> Vec<Section> {
    match &work.contents {
        Content::Blob(text) => vec![Section {
            title: work.title.clone(),
            body: body_xhtml(text),
        }],
        Content::Segments(segments) => segments
            .iter()
            .map(|s| Section {
                title: s.title.clone(),
                body: body_xhtml(&s.text),
            })
            .collect(),
    }
}

/// Remote image sources in a body, in document order.
fn remote_image_sources(body: &str, img: &Selector) -> Vec<String> {
    let fragment = Html::parse_fragment(body);
    fragment
        .select(img)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| crate::cover::is_remote(src))
        .map(String::from)
        .collect()
}

/// Remove every `<img ...>` tag whose src attribute is `src_attr` (already quoted).
fn remove_img_tags(body: &str, src_attr: &str) -> String {
    let mut out = body.to_string();
    while let Some(attr_pos) = out.find(src_attr) {
        let Some(start) = out[..attr_pos].rfind("<img") else {
            break;
        };
        let Some(len) = out[attr_pos..].find('>') else {
            break;
        };
        out.replace_range(start..attr_pos + len + 1, "");
    }
    out
}

/// Download remote illustrations referenced by section bodies and point the bodies at the
/// embedded copies. An image that cannot be fetched is dropped from the body with a warning.
fn embed_illustrations(
    sections: &mut [Section],
    fetch: &mut dyn FnMut(&str) -> Result<Download, FetchError>,
) -> Vec<EmbeddedImage> {
    let Ok(img) = Selector::parse("img") else {
        return Vec::new();
    };
    let mut images: Vec<EmbeddedImage> = Vec::new();
    let mut seen: Vec<(String, Option<String>)> = Vec::new();
    for section in sections.iter_mut() {
        for src in remote_image_sources(&section.body, &img) {
            if seen.iter().any(|(s, _)| *s == src) {
                continue;
            }
            let embedded = match fetch(&src) {
                Ok(download) if !download.bytes.is_empty() => {
                    let hint = download
                        .content_type
                        .as_deref()
                        .and_then(ImageFormat::from_content_type);
                    let format = ImageFormat::detect(&download.bytes, hint);
                    let file_name =
                        format!("illustration-{}.{}", images.len() + 1, format.extension());
                    images.push(EmbeddedImage {
                        file_name: file_name.clone(),
                        data: download.bytes,
                        format,
                    });
                    Some(file_name)
                }
                Ok(_) => {
                    tracing::warn!(url = %src, "Illustration is empty; dropping it");
                    None
                }
                Err(e) => {
                    tracing::warn!(url = %src, error = %e, "Illustration could not be fetched; dropping it");
                    None
                }
            };
            seen.push((src, embedded));
        }
    }
    for section in sections.iter_mut() {
        for (src, embedded) in &seen {
            for quoted in [format!("\"{}\"", xml_escape(src)), format!("\"{}\"", src)] {
                let attr = format!("src={}", quoted);
                section.body = match embedded {
                    Some(name) => section
                        .body
                        .replace(&attr, &format!("src=\"images/{}\"", name)),
                    None => remove_img_tags(&section.body, &attr),
                };
            }
        }
    }
    images
}

/// Package a work into `<output_dir>/<sanitized title>.epub`. Consumes the work.
pub fn package(
    work: Work,
    output_dir: &Path,
    options: &EpubOptions,
    client: &mut PoliteClient,
) -> Result<PathBuf, PackageError> {
    let cover = load_cover(&work.cover, client)?;
    let mut sections = sections_for(&work);
    let images = embed_illustrations(&mut sections, &mut |url: &str| {
        client.get_bytes(url, "illustration")
    });
    if !images.is_empty() {
        tracing::info!(count = images.len(), "Embedded illustrations");
    }
    let path = output_path(&work.title, output_dir);
    let doc = Document {
        source: work.source().to_string(),
        title: work.title,
        authors: work.authors,
        identifier: work.identifier,
        sections,
        cover,
        images,
    };
    write_epub(&doc, &path, options)?;
    tracing::debug!(path = %path.display(), sections = doc.sections.len(), "Wrote EPUB");
    Ok(path)
}
