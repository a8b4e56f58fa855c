//! Core data types that flow through the ingestion, retrieval, reasoning,
//! and memory subsystems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File format of an ingested document, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatTag {
    Pdf,
    Docx,
    Txt,
    Pcap,
}

impl FormatTag {
    /// Map a file extension (without dot, any case) to a format tag.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "pcap" | "pcapng" => Some(Self::Pcap),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Pcap => "pcap",
        }
    }
}

impl std::fmt::Display for FormatTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extraction unit produced by a format extractor: a page for PDFs,
/// a section for word-processor files, the whole body for plain text,
/// the synthetic summary for packet captures.
#[derive(Debug, Clone)]
pub struct Page {
    pub text: String,
    /// 1-based page number where the format has pages.
    pub number: Option<u32>,
}

/// Extraction metadata reported back to the caller after ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMetadata {
    pub pages: Option<usize>,
    pub sections: Option<usize>,
    pub packets_total: Option<usize>,
    pub packets_analyzed: Option<usize>,
}

/// An ingested file. Immutable once extracted.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Source file name (not the full path).
    pub name: String,
    pub format: FormatTag,
    pub metadata: DocMetadata,
    pub ingested_at: DateTime<Utc>,
}

/// A bounded, overlap-aware span of a document's extracted text — the unit
/// of embedding and retrieval. Ordinals are contiguous per document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub text: String,
    /// Character offsets into the document's concatenated extracted text.
    pub start_offset: usize,
    pub end_offset: usize,
    /// Page the chunk starts on, when the source format has pages.
    pub page: Option<u32>,
    pub hash: String,
}

/// A chunk paired with its embedding vector. Owned by the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One retrieval result: a chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// A single step of a reasoning trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningStep {
    Thought { text: String },
    Action { tool: String, input: String },
    Observation { text: String },
    FinalAnswer { text: String },
}

/// A completed query/answer pair with its trace. Append-only; only the
/// feedback fields are ever attached after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub answer: String,
    pub steps: Vec<ReasoningStep>,
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_at: Option<DateTime<Utc>>,
}

/// Summary returned after a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub document_id: String,
    pub name: String,
    pub format: FormatTag,
    pub metadata: DocMetadata,
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tag_from_extension() {
        assert_eq!(FormatTag::from_extension("PDF"), Some(FormatTag::Pdf));
        assert_eq!(FormatTag::from_extension("doc"), Some(FormatTag::Docx));
        assert_eq!(FormatTag::from_extension("pcapng"), Some(FormatTag::Pcap));
        assert_eq!(FormatTag::from_extension("xlsx"), None);
    }

    #[test]
    fn interaction_json_roundtrip() {
        let interaction = Interaction {
            timestamp: Utc::now(),
            query: "What databases are mentioned?".to_string(),
            answer: "A and B".to_string(),
            steps: vec![
                ReasoningStep::Thought {
                    text: "I should search the document".to_string(),
                },
                ReasoningStep::Action {
                    tool: "document_search".to_string(),
                    input: "databases".to_string(),
                },
                ReasoningStep::Observation {
                    text: "…".to_string(),
                },
                ReasoningStep::FinalAnswer {
                    text: "A and B".to_string(),
                },
            ],
            tools_used: vec!["document_search".to_string()],
            feedback: None,
            feedback_at: None,
        };

        let json = serde_json::to_string(&interaction).unwrap();
        let back: Interaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.query, interaction.query);
        assert_eq!(back.steps, interaction.steps);
        assert!(back.feedback.is_none());
    }
}
