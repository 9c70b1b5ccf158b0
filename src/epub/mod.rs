//! EPUB writer. Consumes a [Document] and writes EPUB 2 or EPUB 3 (mimetype, container, OPF,
//! nav/NCX, cover page, sections, images).
//!
//! The archive is written to a temporary file next to the destination and moved into place
//! only once complete, so a failed write leaves nothing behind.

use crate::cover::CoverImage;
use crate::image::ImageFormat;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";
const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

/// EPUB format version.
///
/// Default is EPUB 3 (OPF 3.0, nav.xhtml, HTML5 sections). `Epub2` is for legacy readers
/// (OPF 2.0, NCX, XHTML 1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EpubVersion {
    #[default]
    Epub3,
    Epub2,
}

/// Writer switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubOptions {
    pub version: EpubVersion,
    /// Add toc.ncx to EPUB 3 (EPUB 2 always has it).
    pub include_ncx: bool,
    /// Visible table-of-contents page after the cover.
    pub include_toc_page: bool,
    /// `dc:language` value.
    pub language: String,
}

impl Default for EpubOptions {
    fn default() -> Self {
        EpubOptions {
            version: EpubVersion::Epub3,
            include_ncx: false,
            include_toc_page: true,
            language: "zh".to_string(),
        }
    }
}

/// One section (chapter) of the document. `body` is an XHTML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

/// An image referenced from section bodies as `images/<file_name>`.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub file_name: String,
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

/// Everything the writer needs. Built by the assembler from a work.
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    /// Zero or more; one `dc:creator` each.
    pub authors: Vec<String>,
    /// `dc:identifier`; the source URL is used when absent.
    pub identifier: Option<String>,
    pub source: String,
    pub sections: Vec<Section>,
    /// None gives a title-only cover page.
    pub cover: Option<CoverImage>,
    pub images: Vec<EmbeddedImage>,
}

/// Errors from the EPUB writer. No file is left at the destination when any of these occur.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: the work has no sections.")]
    NoSections,

    #[error("Cannot write EPUB: output directory {path} does not exist.")]
    MissingDirectory { path: PathBuf },

    #[error("Failed to create temporary EPUB file in {dir}")]
    CreateTemp {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move EPUB into place at {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Write `doc` to `path` atomically. An existing file at `path` is replaced.
pub fn write_epub(doc: &Document, path: &Path, options: &EpubOptions) -> Result<(), EpubError> {
    validate_document(doc)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Err(EpubError::MissingDirectory { path: dir });
    }
    let mut tmp = tempfile::Builder::new()
        .prefix(".lnscrape-")
        .suffix(".epub.part")
        .tempfile_in(&dir)
        .map_err(|e| EpubError::CreateTemp {
            dir: dir.clone(),
            source: e,
        })?;

    write_archive(doc, options, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| EpubError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn validate_document(doc: &Document) -> Result<(), EpubError> {
    if doc.title.trim().is_empty() {
        return Err(EpubError::EmptyTitle);
    }
    if doc.sections.is_empty() {
        return Err(EpubError::NoSections);
    }
    Ok(())
}

fn write_archive<W: Write + Seek>(
    doc: &Document,
    options: &EpubOptions,
    out: W,
) -> Result<(), EpubError> {
    let mut zip = ZipWriter::new(out);
    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed (required by the EPUB OCF).
    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE)?;
    zip.start_file("META-INF/container.xml", deflate)?;
    zip.write_all(CONTAINER_XML)?;

    let ncx = match options.version {
        EpubVersion::Epub3 => options.include_ncx,
        EpubVersion::Epub2 => true,
    };
    put(&mut zip, deflate, "content.opf", &opf(doc, options, ncx))?;
    if options.version == EpubVersion::Epub3 {
        put(&mut zip, deflate, "nav.xhtml", &nav_xhtml(doc))?;
    }
    if ncx {
        put(&mut zip, deflate, "toc.ncx", &toc_ncx(doc))?;
    }
    put(&mut zip, deflate, "cover.xhtml", &cover_xhtml(doc, options.version))?;
    if options.include_toc_page {
        put(&mut zip, deflate, "toc.xhtml", &toc_page_xhtml(doc, options.version))?;
    }
    for (i, section) in doc.sections.iter().enumerate() {
        let name = section_file(i);
        put(&mut zip, deflate, &name, &section_xhtml(section, options.version))?;
    }
    if let Some(cover) = &doc.cover {
        let name = format!("{}images/cover.{}", OEBPS_PREFIX, cover.format.extension());
        zip.start_file(name, deflate)?;
        zip.write_all(&cover.data)?;
    }
    for image in &doc.images {
        zip.start_file(format!("{}images/{}", OEBPS_PREFIX, image.file_name), deflate)?;
        zip.write_all(&image.data)?;
    }
    zip.finish()?;
    Ok(())
}

fn put<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    contents: &str,
) -> Result<(), EpubError> {
    zip.start_file(format!("{}{}", OEBPS_PREFIX, name), options)?;
    zip.write_all(contents.as_bytes())?;
    Ok(())
}

fn section_file(index: usize) -> String {
    format!("section-{}.xhtml", index + 1)
}

fn identifier(doc: &Document) -> &str {
    doc.identifier
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&doc.source)
}

fn opf(doc: &Document, options: &EpubOptions, ncx: bool) -> String {
    let mut metadata = format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n    <dc:title>{}</dc:title>\n",
        xml_escape(identifier(doc)),
        xml_escape(&doc.title)
    );
    for author in &doc.authors {
        metadata.push_str(&format!("    <dc:creator>{}</dc:creator>\n", xml_escape(author)));
    }
    metadata.push_str(&format!(
        "    <dc:language>{}</dc:language>\n    <dc:source>{}</dc:source>\n",
        xml_escape(&options.language),
        xml_escape(&doc.source)
    ));
    if doc.cover.is_some() && options.version == EpubVersion::Epub2 {
        metadata.push_str("    <meta name=\"cover\" content=\"cover-img\"/>\n");
    }

    let mut manifest = String::new();
    if options.version == EpubVersion::Epub3 {
        manifest.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
    }
    if ncx {
        manifest.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
    }
    if let Some(cover) = &doc.cover {
        let properties = match options.version {
            EpubVersion::Epub3 => " properties=\"cover-image\"",
            EpubVersion::Epub2 => "",
        };
        manifest.push_str(&format!(
            "    <item id=\"cover-img\" href=\"images/cover.{}\" media-type=\"{}\"{}/>\n",
            cover.format.extension(),
            cover.format.media_type(),
            properties
        ));
    }
    manifest.push_str(
        "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
    );
    if options.include_toc_page {
        manifest.push_str(
            "    <item id=\"toc-page\" href=\"toc.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
        );
    }
    for i in 0..doc.sections.len() {
        manifest.push_str(&format!(
            "    <item id=\"section-{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            i + 1,
            section_file(i)
        ));
    }
    for (i, image) in doc.images.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"image-{}\" href=\"images/{}\" media-type=\"{}\"/>\n",
            i + 1,
            xml_escape(&image.file_name),
            image.format.media_type()
        ));
    }

    // Reading order: cover, optional toc page, sections. Nav is not in the spine.
    let mut spine = String::from("    <itemref idref=\"cover\"/>\n");
    if options.include_toc_page {
        spine.push_str("    <itemref idref=\"toc-page\"/>\n");
    }
    for i in 0..doc.sections.len() {
        spine.push_str(&format!("    <itemref idref=\"section-{}\"/>\n", i + 1));
    }

    let (version, spine_attr) = match options.version {
        EpubVersion::Epub3 if ncx => ("3.0", " toc=\"ncx\""),
        EpubVersion::Epub3 => ("3.0", ""),
        EpubVersion::Epub2 => ("2.0", " toc=\"ncx\""),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="{version}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine{spine_attr}>
{spine}  </spine>
  <guide>
    <reference type="cover" href="cover.xhtml" title="Cover"/>
  </guide>
</package>
"#
    )
}

fn toc_items(doc: &Document) -> String {
    doc.sections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "    <li><a href=\"{}\">{}</a></li>\n",
                section_file(i),
                xml_escape(&s.title)
            )
        })
        .collect()
}

/// Page head for the given version: XHTML 1.1 doctype for EPUB 2, HTML5 for EPUB 3.
fn page(version: EpubVersion, title: &str, body: &str, extra_ns: &str) -> String {
    let doctype = match version {
        EpubVersion::Epub3 => "<!DOCTYPE html>",
        EpubVersion::Epub2 => {
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
        }
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
{doctype}
<html xmlns="http://www.w3.org/1999/xhtml"{extra_ns}>
<head>
  <meta http-equiv="Content-Type" content="text/html; charset=utf-8"/>
  <title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#,
        title = xml_escape(title)
    )
}

fn nav_xhtml(doc: &Document) -> String {
    let body = format!(
        "  <nav epub:type=\"toc\" id=\"toc\">\n    <h1>Contents</h1>\n    <ol>\n{}    </ol>\n  </nav>",
        toc_items(doc)
    );
    page(
        EpubVersion::Epub3,
        "Table of Contents",
        &body,
        " xmlns:epub=\"http://www.idpf.org/2007/ops\"",
    )
}

fn toc_page_xhtml(doc: &Document, version: EpubVersion) -> String {
    let body = format!(
        "  <h1>Table of Contents</h1>\n  <ol>\n{}  </ol>",
        toc_items(doc)
    );
    page(version, "Table of Contents", &body, "")
}

fn toc_ncx(doc: &Document) -> String {
    let mut nav_points = String::new();
    for (i, section) in doc.sections.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{src}"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(&section.title),
            src = section_file(i)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(identifier(doc)),
        xml_escape(&doc.title),
        nav_points
    )
}

fn cover_xhtml(doc: &Document, version: EpubVersion) -> String {
    let body = match &doc.cover {
        Some(cover) => format!(
            "  <div style=\"text-align: center;\">\n    <img src=\"images/cover.{}\" alt=\"Cover\" style=\"max-width: 100%; height: auto;\"/>\n  </div>",
            cover.format.extension()
        ),
        None => format!(
            "  <div style=\"text-align: center; font-family: serif; margin-top: 3em;\">\n    <h1 style=\"font-size: 1.5em;\">{}</h1>\n    <p style=\"margin-top: 1em;\">{}</p>\n  </div>",
            xml_escape(&doc.title),
            xml_escape(&doc.authors.join(", "))
        ),
    };
    page(version, "Cover", &body, "")
}

fn section_xhtml(section: &Section, version: EpubVersion) -> String {
    let body = format!("<h2>{}</h2>\n{}", xml_escape(&section.title), section.body);
    page(version, &section.title, &body, "")
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::read::ZipArchive;

    fn minimal_doc() -> Document {
        Document {
            title: "Test Book".to_string(),
            authors: vec!["A".to_string(), "B".to_string()],
            identifier: None,
            source: "https://www.lightnovel.us/cn/detail/1".to_string(),
            sections: vec![Section {
                title: "Chapter 1".to_string(),
                body: "<p>First paragraph.</p>".to_string(),
            }],
            cover: None,
            images: Vec::new(),
        }
    }

    fn read_entry(path: &Path, name: &str) -> Result<String, Box<dyn std::error::Error>> {
        let mut zip = ZipArchive::new(std::fs::File::open(path)?)?;
        let mut entry = zip.by_name(name)?;
        let mut s = String::new();
        entry.read_to_string(&mut s)?;
        Ok(s)
    }

    fn entry_names(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        let zip = ZipArchive::new(std::fs::File::open(path)?)?;
        Ok(zip.file_names().map(String::from).collect())
    }

    #[test]
    fn rejects_empty_title_without_creating_a_file() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let mut doc = minimal_doc();
        doc.title = "  ".to_string();
        let path = tmp.path().join("out.epub");
        let result = write_epub(&doc, &path, &EpubOptions::default());
        assert!(matches!(result, Err(EpubError::EmptyTitle)));
        assert_eq!(std::fs::read_dir(tmp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn rejects_no_sections() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let mut doc = minimal_doc();
        doc.sections.clear();
        let result = write_epub(&doc, &tmp.path().join("out.epub"), &EpubOptions::default());
        assert!(matches!(result, Err(EpubError::NoSections)));
        Ok(())
    }

    #[test]
    fn missing_output_directory_is_an_error() {
        let path = PathBuf::from("/nonexistent_dir_lnscrape_xyz/out.epub");
        let result = write_epub(&minimal_doc(), &path, &EpubOptions::default());
        assert!(matches!(result, Err(EpubError::MissingDirectory { .. })));
    }

    #[test]
    fn epub3_layout_and_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        write_epub(&minimal_doc(), &path, &EpubOptions::default())?;
        let names = entry_names(&path)?;
        assert_eq!(names[0], "mimetype");
        for expected in [
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/cover.xhtml",
            "OEBPS/toc.xhtml",
            "OEBPS/section-1.xhtml",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert!(!names.iter().any(|n| n == "OEBPS/toc.ncx"));
        let opf = read_entry(&path, "OEBPS/content.opf")?;
        assert!(opf.contains("version=\"3.0\""));
        assert!(opf.contains("<dc:creator>A</dc:creator>"));
        assert!(opf.contains("<dc:creator>B</dc:creator>"));
        assert!(opf.contains(
            "<dc:identifier id=\"book-id\">https://www.lightnovel.us/cn/detail/1</dc:identifier>"
        ));
        assert!(opf.contains("<dc:language>zh</dc:language>"));
        // Only the finished EPUB remains in the directory.
        assert_eq!(std::fs::read_dir(tmp.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn epub2_has_ncx_and_no_nav() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        let options = EpubOptions {
            version: EpubVersion::Epub2,
            ..EpubOptions::default()
        };
        write_epub(&minimal_doc(), &path, &options)?;
        let names = entry_names(&path)?;
        assert!(names.iter().any(|n| n == "OEBPS/toc.ncx"));
        assert!(!names.iter().any(|n| n == "OEBPS/nav.xhtml"));
        let opf = read_entry(&path, "OEBPS/content.opf")?;
        assert!(opf.contains("version=\"2.0\"") && opf.contains("toc=\"ncx\""));
        let section = read_entry(&path, "OEBPS/section-1.xhtml")?;
        assert!(section.contains("XHTML 1.1"));
        Ok(())
    }

    #[test]
    fn epub3_with_ncx_includes_toc_ncx() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        let options = EpubOptions {
            include_ncx: true,
            ..EpubOptions::default()
        };
        write_epub(&minimal_doc(), &path, &options)?;
        assert!(entry_names(&path)?.iter().any(|n| n == "OEBPS/toc.ncx"));
        Ok(())
    }

    #[test]
    fn toc_page_false_omits_toc_xhtml() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        let options = EpubOptions {
            include_toc_page: false,
            ..EpubOptions::default()
        };
        write_epub(&minimal_doc(), &path, &options)?;
        assert!(!entry_names(&path)?.iter().any(|n| n == "OEBPS/toc.xhtml"));
        assert!(!read_entry(&path, "OEBPS/content.opf")?.contains("toc-page"));
        Ok(())
    }

    #[test]
    fn sections_keep_order_and_titles() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        let mut doc = minimal_doc();
        doc.sections = ["一", "二", "一"]
            .iter()
            .map(|t| Section {
                title: t.to_string(),
                body: format!("<p>{}</p>", t),
            })
            .collect();
        write_epub(&doc, &path, &EpubOptions::default())?;
        let nav = read_entry(&path, "OEBPS/nav.xhtml")?;
        let first = nav.find("section-1.xhtml\">一").ok_or("section 1 not in nav")?;
        let second = nav.find("section-2.xhtml\">二").ok_or("section 2 not in nav")?;
        let third = nav.find("section-3.xhtml\">一").ok_or("section 3 not in nav")?;
        assert!(first < second && second < third);
        assert!(read_entry(&path, "OEBPS/section-2.xhtml")?.contains("<h2>二</h2>"));
        Ok(())
    }

    #[test]
    fn cover_image_is_embedded() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        let mut doc = minimal_doc();
        doc.cover = Some(CoverImage {
            data: b"\x89PNG\r\n\x1a\nxx".to_vec(),
            format: ImageFormat::Png,
        });
        write_epub(&doc, &path, &EpubOptions::default())?;
        assert!(entry_names(&path)?.iter().any(|n| n == "OEBPS/images/cover.png"));
        let opf = read_entry(&path, "OEBPS/content.opf")?;
        assert!(opf.contains("properties=\"cover-image\""));
        assert!(read_entry(&path, "OEBPS/cover.xhtml")?.contains("images/cover.png"));
        Ok(())
    }

    #[test]
    fn no_cover_gives_title_only_cover_page() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        write_epub(&minimal_doc(), &path, &EpubOptions::default())?;
        let cover = read_entry(&path, "OEBPS/cover.xhtml")?;
        assert!(cover.contains("<h1 style=\"font-size: 1.5em;\">Test Book</h1>"));
        assert!(cover.contains("A, B"));
        Ok(())
    }

    #[test]
    fn existing_file_is_replaced() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("out.epub");
        std::fs::write(&path, b"stale")?;
        write_epub(&minimal_doc(), &path, &EpubOptions::default())?;
        assert!(entry_names(&path)?.contains(&"mimetype".to_string()));
        Ok(())
    }

    #[test]
    fn xml_escape_all_specials() {
        assert_eq!(xml_escape("<a & 'b' \"c\">"), "&lt;a &amp; &apos;b&apos; &quot;c&quot;&gt;");
    }
}
