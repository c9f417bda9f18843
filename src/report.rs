//! Human-readable summaries of processed documents.
//!
//! Each report serializes to JSON for API clients and implements `Display`
//! for the plain-text console layout. Element text is resolved from text
//! anchors only while the report is built.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::batch::{BatchOutcome, SkippedOutput};
use crate::documentai::document::{BreakType, Document, Entity, LayoutElement, Page};
use crate::resolver::TextBuffer;

/// SHA-256 of uploaded content, hex encoded.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Uploaded file a report was produced from.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub filename: String,
    pub content_hash: String,
    pub size: usize,
}

impl Source {
    pub fn new(filename: impl Into<String>, data: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content_hash: content_hash(data),
            size: data.len(),
        }
    }
}

// ============================================================================
// OCR
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OcrReport {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub text: String,
    pub page_count: usize,
    pub pages: Vec<PageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub languages: Vec<LanguageReport>,
    pub paragraphs: ElementSummary,
    pub blocks: ElementSummary,
    pub lines: ElementSummary,
    pub tokens: TokenSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageReport {
    pub code: String,
    pub confidence: f64,
}

/// Count plus first/last text of one kind of layout element.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElementSummary {
    pub count: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenSummary {
    #[serde(flatten)]
    pub text: ElementSummary,
    pub first_break: Option<BreakType>,
    pub last_break: Option<BreakType>,
}

impl OcrReport {
    pub fn from_document(document: &Document) -> Self {
        let buffer = document.text_buffer();
        Self {
            id: format!("ocr_{}", Uuid::new_v4().simple()),
            source: None,
            text: document.text.clone(),
            page_count: document.pages.len(),
            pages: document
                .pages
                .iter()
                .map(|p| PageReport::from_page(p, &buffer))
                .collect(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }
}

impl PageReport {
    fn from_page(page: &Page, buffer: &TextBuffer<'_>) -> Self {
        let tokens = TokenSummary {
            text: summarize(&page.tokens, buffer),
            first_break: page.tokens.first().map(|t| t.break_type()),
            last_break: page.tokens.last().map(|t| t.break_type()),
        };

        Self {
            page_number: page.page_number,
            width: page.dimension.as_ref().map(|d| d.width),
            height: page.dimension.as_ref().map(|d| d.height),
            languages: page
                .detected_languages
                .iter()
                .map(|l| LanguageReport {
                    code: l.language_code.clone(),
                    confidence: l.confidence,
                })
                .collect(),
            paragraphs: summarize(&page.paragraphs, buffer),
            blocks: summarize(&page.blocks, buffer),
            lines: summarize(&page.lines, buffer),
            tokens,
        }
    }
}

fn summarize<T: LayoutElement>(elements: &[T], buffer: &TextBuffer<'_>) -> ElementSummary {
    let text_of = |element: &T| match element.layout().text(buffer) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Skipping element with invalid text anchor: {}", e);
            None
        }
    };

    ElementSummary {
        count: elements.len(),
        first: elements.first().and_then(text_of),
        last: elements.last().and_then(text_of),
    }
}

fn write_optional(f: &mut fmt::Formatter<'_>, label: &str, text: &Option<String>) -> fmt::Result {
    match text {
        Some(t) => writeln!(f, "        {}: {:?}", label, t),
        None => writeln!(f, "        {}: <none>", label),
    }
}

impl fmt::Display for OcrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Full document text: {}\n", self.text)?;
        writeln!(f, "There are {} page(s) in this document.\n", self.page_count)?;
        for page in &self.pages {
            write!(f, "{}", page)?;
        }
        Ok(())
    }
}

impl fmt::Display for PageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Page {}:", self.page_number)?;
        if let (Some(width), Some(height)) = (self.width, self.height) {
            writeln!(f, "    Width: {:?}", width)?;
            writeln!(f, "    Height: {:?}", height)?;
        }

        writeln!(f, "    Detected languages:")?;
        for lang in &self.languages {
            writeln!(f, "        {} ({:.1}% confidence)", lang.code, lang.confidence * 100.0)?;
        }

        writeln!(f, "    {} paragraphs detected:", self.paragraphs.count)?;
        write_optional(f, "First paragraph text", &self.paragraphs.first)?;
        write_optional(f, "Last paragraph text", &self.paragraphs.last)?;

        writeln!(f, "    {} blocks detected:", self.blocks.count)?;
        write_optional(f, "First text block", &self.blocks.first)?;
        write_optional(f, "Last text block", &self.blocks.last)?;

        writeln!(f, "    {} lines detected:", self.lines.count)?;
        write_optional(f, "First line text", &self.lines.first)?;
        write_optional(f, "Last line text", &self.lines.last)?;

        writeln!(f, "    {} tokens detected:", self.tokens.text.count)?;
        write_optional(f, "First token text", &self.tokens.text.first)?;
        if let Some(b) = self.tokens.first_break {
            writeln!(f, "        First token break type: {:?}", b.as_str())?;
        }
        write_optional(f, "Last token text", &self.tokens.text.last)?;
        if let Some(b) = self.tokens.last_break {
            writeln!(f, "        Last token break type: {:?}", b.as_str())?;
        }
        Ok(())
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Number of top-level entities.
    pub count: usize,
    /// Entities in document order, each followed by its nested properties.
    pub entities: Vec<EntityEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityEntry {
    /// 0 for top-level entities, 1 for their properties, and so on.
    pub depth: usize,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub text: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<String>,
}

impl EntityReport {
    pub fn from_document(document: &Document) -> Self {
        let buffer = document.text_buffer();
        let mut entities = Vec::new();
        flatten_entities(&document.entities, 0, &buffer, &mut entities);

        Self {
            id: format!("ent_{}", Uuid::new_v4().simple()),
            source: None,
            count: document.entities.len(),
            entities,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }
}

fn flatten_entities(
    entities: &[Entity],
    depth: usize,
    buffer: &TextBuffer<'_>,
    out: &mut Vec<EntityEntry>,
) {
    for entity in entities {
        let text = match entity.anchor_text(buffer) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Entity '{}' has an invalid text anchor: {}", entity.entity_type, e);
                None
            }
        };

        out.push(EntityEntry {
            depth,
            entity_type: entity.entity_type.clone(),
            text,
            confidence: entity.confidence,
            normalized_value: entity.normalized_text().map(str::to_string),
        });

        flatten_entities(&entity.properties, depth + 1, buffer, out);
    }
}

impl fmt::Display for EntityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found {} entities:", self.count)?;
        for entry in &self.entities {
            let text = entry.text.as_deref().unwrap_or("");
            writeln!(
                f,
                "    * {:?}: {:?}({:.1}% confident)",
                entry.entity_type,
                text,
                entry.confidence * 100.0
            )?;
            if let Some(normalized) = &entry.normalized_value {
                writeln!(f, "    * Normalized Value: {:?}", normalized)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub id: String,
    pub operation: String,
    pub state_message: String,
    pub files: Vec<BatchFileReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFileReport {
    pub input: String,
    pub object: String,
    pub page_count: usize,
    pub text: String,
}

impl BatchReport {
    pub fn from_outcome(outcome: &BatchOutcome) -> Self {
        Self {
            id: format!("batch_{}", Uuid::new_v4().simple()),
            operation: outcome.operation.clone(),
            state_message: outcome.state_message.clone(),
            files: outcome
                .documents
                .iter()
                .map(|d| BatchFileReport {
                    input: d.input.clone(),
                    object: d.object.clone(),
                    page_count: d.document.pages.len(),
                    text: d.document.text.clone(),
                })
                .collect(),
            skipped: outcome.skipped.clone(),
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Operation {}: {}", self.operation, self.state_message)?;
        writeln!(f, "Output files:")?;
        for skipped in &self.skipped {
            writeln!(f, "Skipping {} - {}", skipped.location, skipped.reason)?;
        }
        for file in &self.files {
            writeln!(f, "Fetched {}", file.object)?;
            writeln!(f, "The document contains the following text:")?;
            writeln!(f, "{}", file.text)?;
        }
        Ok(())
    }
}
