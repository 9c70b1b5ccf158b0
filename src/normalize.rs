//! Content normalizer. Classifies fetched contents into [Content] and applies variant
//! conversion to every text field, keeping segment order and boundaries.

use crate::convert::{Converter, VariantCode};
use crate::model::{Content, Segment};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Malformed contents: contents must be text or an ordered list of titled entries ({reason}).")]
    MalformedContents { reason: String },
}

/// One fetched entry. `text` is accepted as an alias of `content`; other keys are ignored.
#[derive(Debug, Deserialize)]
struct RawEntry {
    title: String,
    #[serde(alias = "text")]
    content: String,
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Classify raw fetched contents: a string is a blob, an array of `{title, content}`
/// objects is a segment list. Anything else is an error.
pub fn classify(raw: Value) -> Result<Content, NormalizeError> {
    match raw {
        Value::String(text) => Ok(Content::Blob(text)),
        Value::Array(items) => {
            let mut segments = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let kind = value_kind(&item);
                let entry: RawEntry =
                    serde_json::from_value(item).map_err(|e| NormalizeError::MalformedContents {
                        reason: format!("entry {} is {}: {}", i + 1, kind, e),
                    })?;
                segments.push(Segment {
                    title: entry.title,
                    text: entry.content,
                });
            }
            Ok(Content::Segments(segments))
        }
        other => Err(NormalizeError::MalformedContents {
            reason: format!("found {}", value_kind(&other)),
        }),
    }
}

/// Apply `code` to every text field. The blob text as a whole; for segments, title and text
/// of each entry independently.
pub fn convert_content(content: Content, code: VariantCode, converter: &dyn Converter) -> Content {
    match content {
        Content::Blob(text) => Content::Blob(converter.convert(&text, code)),
        Content::Segments(segments) => Content::Segments(
            segments
                .into_iter()
                .map(|s| Segment {
                    title: converter.convert(&s.title, code),
                    text: converter.convert(&s.text, code),
                })
                .collect(),
        ),
    }
}

/// Classify then convert. With no code, contents pass through unchanged.
pub fn normalize(
    raw: Value,
    code: Option<VariantCode>,
    converter: &dyn Converter,
) -> Result<Content, NormalizeError> {
    let content = classify(raw)?;
    let Some(code) = code else {
        return Ok(content);
    };
    if !code.is_supported() {
        tracing::warn!(code = %code, "Conversion not supported by the conversion engine; text left unchanged");
        return Ok(content);
    }
    tracing::debug!(code = %code, sections = content.section_count(), "Converting text variant");
    Ok(convert_content(content, code, converter))
}
