//! Metadata extraction from text documents.
//!
//! A document opens with a YAML front matter block:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [a, b]
//! ---
//! Body text
//! ```
//!
//! The block becomes the document's fields and the remainder its contents.

use crate::error::PipelineError;
use serde_json::{Map, Value};

/// Fields and body split out of one text document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub fields: Map<String, Value>,
    pub body: String,
}

/// Splits a text document into metadata fields and body.
///
/// Returning zero fields is allowed here; the pipeline treats it as a
/// malformed document.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<ExtractedDocument, PipelineError>;
}

/// YAML front matter delimited by `---` lines. The closing line may also be
/// `...`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterExtractor;

impl FrontMatterExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Byte ranges of the YAML block and the body, if the text opens with a
    /// complete block.
    fn split(text: &str) -> Option<(&str, &str)> {
        let mut lines = text.split_inclusive('\n');
        let opening = lines.next()?;
        if opening.trim_end() != "---" {
            return None;
        }

        let yaml_start = opening.len();
        let mut offset = yaml_start;
        for line in lines {
            let delimiter = line.trim_end();
            if delimiter == "---" || delimiter == "..." {
                return Some((&text[yaml_start..offset], &text[offset + line.len()..]));
            }
            offset += line.len();
        }
        None
    }
}

impl MetadataExtractor for FrontMatterExtractor {
    fn extract(&self, text: &str) -> Result<ExtractedDocument, PipelineError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let Some((yaml, body)) = Self::split(text) else {
            return Ok(ExtractedDocument {
                fields: Map::new(),
                body: text.to_string(),
            });
        };

        let parsed: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| PipelineError::Metadata(e.to_string()))?;

        let fields = match parsed {
            serde_yaml::Value::Null => Map::new(),
            serde_yaml::Value::Mapping(_) => match serde_json::to_value(&parsed) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => return Err(PipelineError::Metadata(e.to_string())),
            },
            _ => {
                return Err(PipelineError::Metadata(
                    "front matter is not a mapping".to_string(),
                ))
            }
        };

        Ok(ExtractedDocument {
            fields,
            body: body.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_matter_split() {
        let doc = "---\ntitle: Hello\ntags:\n  - a\n  - b\n---\nBody\n";
        let extracted = FrontMatterExtractor::new().extract(doc).unwrap();

        assert_eq!(extracted.fields["title"], Value::from("Hello"));
        assert_eq!(extracted.fields["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(extracted.body, "Body\n");
    }

    #[test]
    fn test_crlf_and_bom() {
        let doc = "\u{feff}---\r\ndraft: true\r\n...\r\nText";
        let extracted = FrontMatterExtractor::new().extract(doc).unwrap();

        assert_eq!(extracted.fields["draft"], Value::Bool(true));
        assert_eq!(extracted.body, "Text");
    }

    #[test]
    fn test_no_front_matter_yields_no_fields() {
        let extracted = FrontMatterExtractor::new().extract("just text").unwrap();
        assert!(extracted.fields.is_empty());
        assert_eq!(extracted.body, "just text");
    }

    #[test]
    fn test_unterminated_block_is_not_front_matter() {
        let extracted = FrontMatterExtractor::new()
            .extract("---\ntitle: x\n")
            .unwrap();
        assert!(extracted.fields.is_empty());
    }

    #[test]
    fn test_empty_block_yields_no_fields() {
        let extracted = FrontMatterExtractor::new().extract("---\n---\nbody").unwrap();
        assert!(extracted.fields.is_empty());
        assert_eq!(extracted.body, "body");
    }

    #[test]
    fn test_invalid_yaml_and_scalars_are_errors() {
        let extractor = FrontMatterExtractor::new();
        assert!(matches!(
            extractor.extract("---\ntitle: [unclosed\n---\n"),
            Err(PipelineError::Metadata(_))
        ));
        assert!(matches!(
            extractor.extract("---\njust a string\n---\n"),
            Err(PipelineError::Metadata(_))
        ));
    }
}
