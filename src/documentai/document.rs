//! Document AI `Document` model.
//!
//! Only the parts the reports read are modelled; unknown fields are ignored so
//! result files from newer processor versions still parse. Field names follow
//! the proto3 JSON mapping (camelCase, int64 as strings).

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::resolver::{OffsetRange, OutOfBoundsError, TextBuffer};

/// A processed document: the full text plus structure that points into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<Page>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

impl Document {
    /// Parse a document from its JSON encoding (as written to Cloud Storage
    /// by batch processing).
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Borrow the document text as an offset-addressable buffer.
    pub fn text_buffer(&self) -> TextBuffer<'_> {
        TextBuffer::new(&self.text)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 1-based page number.
    #[serde(default)]
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Dimension>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_languages: Vec<DetectedLanguage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<Line>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLanguage {
    #[serde(default)]
    pub language_code: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Text anchor and detection confidence shared by every layout element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default)]
    pub text_anchor: TextAnchor,
    #[serde(default)]
    pub confidence: f64,
}

impl Layout {
    pub fn text(&self, buffer: &TextBuffer<'_>) -> Result<String, OutOfBoundsError> {
        self.text_anchor.resolve(buffer)
    }
}

/// Elements that locate their text through a [`Layout`].
pub trait LayoutElement {
    fn layout(&self) -> &Layout;
}

macro_rules! layout_element {
    ($($name:ident),+) => {
        $(
            #[derive(Debug, Clone, Default, Serialize, Deserialize)]
            pub struct $name {
                #[serde(default)]
                pub layout: Layout,
            }

            impl LayoutElement for $name {
                fn layout(&self) -> &Layout {
                    &self.layout
                }
            }
        )+
    };
}

layout_element!(Block, Paragraph, Line);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_break: Option<DetectedBreak>,
}

impl LayoutElement for Token {
    fn layout(&self) -> &Layout {
        &self.layout
    }
}

impl Token {
    /// Break type following this token (`TYPE_UNSPECIFIED` when absent).
    pub fn break_type(&self) -> BreakType {
        self.detected_break
            .as_ref()
            .map(|b| b.break_type)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedBreak {
    #[serde(rename = "type", default)]
    pub break_type: BreakType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakType {
    #[default]
    TypeUnspecified,
    Space,
    WideSpace,
    Hyphen,
    #[serde(other)]
    Unknown,
}

impl BreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakType::TypeUnspecified => "TYPE_UNSPECIFIED",
            BreakType::Space => "SPACE",
            BreakType::WideSpace => "WIDE_SPACE",
            BreakType::Hyphen => "HYPHEN",
            BreakType::Unknown => "UNKNOWN",
        }
    }
}

/// Offsets into [`Document::text`] backing a layout element or entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnchor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_segments: Vec<TextSegment>,
    /// Pre-resolved text; only populated on some entity anchors.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
}

impl TextAnchor {
    pub fn ranges(&self) -> Vec<OffsetRange> {
        self.text_segments
            .iter()
            .map(|s| OffsetRange::new(s.start_index, s.end_index))
            .collect()
    }

    pub fn resolve(&self, buffer: &TextBuffer<'_>) -> Result<String, OutOfBoundsError> {
        buffer.resolve(&self.ranges())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    #[serde(default, deserialize_with = "int64")]
    pub start_index: usize,
    #[serde(default, deserialize_with = "int64")]
    pub end_index: usize,
}

/// An extracted field, such as a form value on a W-9.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_text: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub text_anchor: TextAnchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<NormalizedValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Entity>,
}

impl Entity {
    /// The entity's text: the anchor's own `content` when the processor
    /// filled it in, otherwise the anchor resolved against the document.
    pub fn anchor_text(&self, buffer: &TextBuffer<'_>) -> Result<String, OutOfBoundsError> {
        if !self.text_anchor.content.is_empty() {
            return Ok(self.text_anchor.content.clone());
        }
        self.text_anchor.resolve(buffer)
    }

    /// Normalized text value, if the processor produced a non-empty one.
    pub fn normalized_text(&self) -> Option<&str> {
        self.normalized_value
            .as_ref()
            .map(|v| v.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedValue {
    #[serde(default)]
    pub text: String,
}

/// Accept int64 fields encoded either as JSON strings (proto3 mapping) or numbers.
fn int64<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => usize::try_from(n).map_err(de::Error::custom),
        Repr::Text(s) => s
            .parse::<usize>()
            .map_err(|e| de::Error::custom(format!("invalid int64 '{}': {}", s, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "mimeType": "application/pdf",
        "text": "Form W-9\nName\nJane Doe\n",
        "pages": [{
            "pageNumber": 1,
            "dimension": {"width": 1758, "height": 2275, "unit": "pixels"},
            "detectedLanguages": [{"languageCode": "en", "confidence": 0.98}],
            "paragraphs": [
                {"layout": {"textAnchor": {"textSegments": [{"endIndex": "9"}]}}}
            ],
            "tokens": [
                {"layout": {"textAnchor": {"textSegments": [{"startIndex": "0", "endIndex": "4"}]}},
                 "detectedBreak": {"type": "SPACE"}},
                {"layout": {"textAnchor": {"textSegments": [{"startIndex": 5, "endIndex": 8}]}}}
            ],
            "someFutureField": {"ignored": true}
        }],
        "entities": [{
            "type": "Name",
            "mentionText": "Jane Doe",
            "confidence": 0.91,
            "textAnchor": {"textSegments": [{"startIndex": "14", "endIndex": "22"}]},
            "normalizedValue": {"text": "JANE DOE"},
            "properties": [{"type": "FirstName", "textAnchor": {"textSegments": [{"startIndex": "14", "endIndex": "18"}], "content": "Jane"}}]
        }]
    }"#;

    #[test]
    fn test_parse_proto_json() {
        let doc = Document::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.mime_type.as_deref(), Some("application/pdf"));

        let page = &doc.pages[0];
        assert_eq!(page.page_number, 1);
        assert_eq!(page.dimension.as_ref().unwrap().width, 1758.0);
        assert_eq!(page.detected_languages[0].language_code, "en");
        assert_eq!(page.tokens[0].break_type(), BreakType::Space);
        assert_eq!(page.tokens[1].break_type(), BreakType::TypeUnspecified);
    }

    #[test]
    fn test_missing_start_index_defaults_to_zero() {
        let doc = Document::from_json(SAMPLE.as_bytes()).unwrap();
        let segment = doc.pages[0].paragraphs[0].layout.text_anchor.text_segments[0];
        assert_eq!(segment, TextSegment { start_index: 0, end_index: 9 });
    }

    #[test]
    fn test_layout_text_resolves_against_document() {
        let doc = Document::from_json(SAMPLE.as_bytes()).unwrap();
        let buffer = doc.text_buffer();
        let page = &doc.pages[0];

        assert_eq!(page.paragraphs[0].layout().text(&buffer).unwrap(), "Form W-9\n");
        assert_eq!(page.tokens[0].layout().text(&buffer).unwrap(), "Form");
        assert_eq!(page.tokens[1].layout().text(&buffer).unwrap(), "W-9");
    }

    #[test]
    fn test_entity_anchor_text_prefers_content() {
        let doc = Document::from_json(SAMPLE.as_bytes()).unwrap();
        let buffer = doc.text_buffer();
        let entity = &doc.entities[0];

        assert_eq!(entity.anchor_text(&buffer).unwrap(), "Jane Doe");
        assert_eq!(entity.normalized_text(), Some("JANE DOE"));
        assert_eq!(entity.properties[0].anchor_text(&buffer).unwrap(), "Jane");
        assert_eq!(entity.properties[0].normalized_text(), None);
    }

    #[test]
    fn test_unknown_break_type() {
        let token: Token =
            serde_json::from_str(r#"{"detectedBreak": {"type": "SOMETHING_NEW"}}"#).unwrap();
        assert_eq!(token.break_type(), BreakType::Unknown);
    }

    #[test]
    fn test_invalid_int64_rejected() {
        let result: Result<TextSegment, _> =
            serde_json::from_str(r#"{"startIndex": "abc", "endIndex": "3"}"#);
        assert!(result.is_err());
    }
}
