//! Tool catalogue and dispatch for the reasoning loop.
//!
//! The loop only ever sees tool names and plain-text inputs; every tool
//! returns a plain-text observation. Tools whose external collaborator is
//! not configured (web search without an API key) are left out of the
//! catalogue entirely, so the model is never offered something that would
//! fail.

pub mod analysis;
pub mod calculator;
pub mod lookup;

use tracing::debug;

use crate::config::{EmbeddingConfig, ToolsConfig};
use crate::embedding::embed_query;
use crate::error::ToolError;
use crate::index::VectorIndex;

/// Closed set of tool identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    DocumentSearch,
    Calculator,
    TextAnalysis,
    DataFormatter,
    WebSearch,
    Wikipedia,
}

impl ToolName {
    /// Parse a tool name leniently: case-insensitive, with spaces, hyphens,
    /// and underscores treated alike.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "documentsearch" => Some(Self::DocumentSearch),
            "calculator" => Some(Self::Calculator),
            "textanalysis" => Some(Self::TextAnalysis),
            "dataformatter" => Some(Self::DataFormatter),
            "websearch" => Some(Self::WebSearch),
            "wikipedia" => Some(Self::Wikipedia),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentSearch => "document_search",
            Self::Calculator => "calculator",
            Self::TextAnalysis => "text_analysis",
            Self::DataFormatter => "data_formatter",
            Self::WebSearch => "web_search",
            Self::Wikipedia => "wikipedia",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::DocumentSearch => {
                "Search the loaded document for passages relevant to a query. \
                 Input: a search query in plain text."
            }
            Self::Calculator => {
                "Evaluate an arithmetic expression. Supports + - * / ^, \
                 parentheses, sqrt/sin/cos/tan/log/ln/exp/abs, percentages \
                 ('15%', 'X% of Y'). Input: the expression only."
            }
            Self::TextAnalysis => {
                "Report word and sentence counts, average word length, and top \
                 keywords for a piece of text. Input: the text to analyze."
            }
            Self::DataFormatter => {
                "Reformat comma-, semicolon-, or newline-separated items as a \
                 bullet list. Input: the raw data."
            }
            Self::WebSearch => {
                "Search the web for current information. Input: a search query."
            }
            Self::Wikipedia => {
                "Look up the summary of a Wikipedia article. Input: the topic name."
            }
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of tools available to one query, borrowing the active index.
pub struct Toolbox<'a> {
    pub index: Option<&'a VectorIndex>,
    pub embedding: &'a EmbeddingConfig,
    pub top_k: usize,
    pub tools: &'a ToolsConfig,
}

impl<'a> Toolbox<'a> {
    /// Tools offered to the model for this query. Web search only appears
    /// when its API key is configured.
    pub fn catalogue(&self) -> Vec<ToolName> {
        let mut names = vec![
            ToolName::DocumentSearch,
            ToolName::Calculator,
            ToolName::TextAnalysis,
            ToolName::DataFormatter,
        ];
        if lookup::web_search_available() {
            names.push(ToolName::WebSearch);
        }
        names.push(ToolName::Wikipedia);
        names
    }

    /// One line per tool for the reasoning prompt.
    pub fn render_catalogue(&self) -> String {
        self.catalogue()
            .iter()
            .map(|t| format!("- {}: {}", t.as_str(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatch a tool call by name. Unknown names and uncatalogued tools
    /// fail with typed errors the loop turns into observations.
    pub async fn invoke(&self, name: &str, input: &str) -> Result<String, ToolError> {
        let tool =
            ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if !self.catalogue().contains(&tool) {
            return Err(ToolError::ToolUnavailable(format!(
                "{} is not configured",
                tool
            )));
        }
        validate_input(input)?;
        debug!(tool = tool.as_str(), input_len = input.len(), "invoking tool");

        match tool {
            ToolName::DocumentSearch => self.document_search(input).await,
            ToolName::Calculator => calculator::evaluate(input),
            ToolName::TextAnalysis => Ok(analysis::text_analysis(input)),
            ToolName::DataFormatter => Ok(analysis::data_formatter(input)),
            ToolName::WebSearch => lookup::web_search(self.tools, input).await,
            ToolName::Wikipedia => lookup::wikipedia(self.tools, input).await,
        }
    }

    /// Retrieve the best-matching chunks for a query and render them with
    /// their source attribution.
    async fn document_search(&self, query: &str) -> Result<String, ToolError> {
        let Some(index) = self.index else {
            return Err(ToolError::EmptyIndex);
        };
        if index.is_empty() {
            return Err(ToolError::EmptyIndex);
        }

        let query_vec = embed_query(self.embedding, query)
            .await
            .map_err(|e| ToolError::LookupFailed(format!("embedding failed: {}", e)))?;

        let hits = index.query(&query_vec, self.top_k);
        if hits.is_empty() {
            return Ok("No relevant passages were found.".to_string());
        }

        let mut out = String::new();
        for (i, hit) in hits.iter().enumerate() {
            let source = index
                .document_name(&hit.chunk.document_id)
                .unwrap_or("unknown source");
            let location = match hit.chunk.page {
                Some(page) => format!("{}, page {}", source, page),
                None => source.to_string(),
            };
            out.push_str(&format!(
                "[{}] ({}) {}\n\n",
                i + 1,
                location,
                hit.chunk.text.trim()
            ));
        }
        Ok(out.trim_end().to_string())
    }
}

/// Tool inputs must be plain text: no NUL or other non-whitespace control
/// characters.
fn validate_input(input: &str) -> Result<(), ToolError> {
    if input
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err(ToolError::InvalidInput(
            "tool input must be plain text".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::embedding::embed_texts;
    use crate::models::{DocMetadata, Document, FormatTag};
    use chrono::Utc;

    fn test_config() -> (EmbeddingConfig, ToolsConfig) {
        (
            EmbeddingConfig {
                dims: 128,
                ..EmbeddingConfig::default()
            },
            ToolsConfig::default(),
        )
    }

    async fn index_with(text: &str) -> VectorIndex {
        let doc = Document {
            id: "d1".to_string(),
            name: "notes.txt".to_string(),
            format: FormatTag::Txt,
            metadata: DocMetadata::default(),
            ingested_at: Utc::now(),
        };
        let chunks = chunk_text("d1", text, 200, 40);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let cfg = EmbeddingConfig {
            dims: 128,
            ..EmbeddingConfig::default()
        };
        let embeddings = embed_texts(&cfg, &texts).await.unwrap();
        VectorIndex::build(doc, chunks, embeddings).unwrap()
    }

    #[test]
    fn tool_names_parse_leniently() {
        assert_eq!(ToolName::parse("Document Search"), Some(ToolName::DocumentSearch));
        assert_eq!(ToolName::parse("document_search"), Some(ToolName::DocumentSearch));
        assert_eq!(ToolName::parse("CALCULATOR"), Some(ToolName::Calculator));
        assert_eq!(ToolName::parse("shell"), None);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let (embedding, tools) = test_config();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        assert!(matches!(
            toolbox.invoke("python_exec", "print(1)").await,
            Err(ToolError::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn document_search_without_index_is_empty_index() {
        let (embedding, tools) = test_config();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        assert!(matches!(
            toolbox.invoke("document_search", "databases").await,
            Err(ToolError::EmptyIndex)
        ));
    }

    #[tokio::test]
    async fn document_search_returns_attributed_passages() {
        let index = index_with(
            "The cluster uses postgres for durable storage.\n\n\
             Redis caches hot keys in front of it.\n\n\
             Deployment notes live elsewhere.",
        )
        .await;
        let (embedding, tools) = test_config();
        let toolbox = Toolbox {
            index: Some(&index),
            embedding: &embedding,
            top_k: 2,
            tools: &tools,
        };
        let obs = toolbox.invoke("document_search", "postgres storage").await.unwrap();
        assert!(obs.contains("notes.txt"));
        assert!(obs.contains("postgres"));
    }

    #[tokio::test]
    async fn calculator_dispatch_works() {
        let (embedding, tools) = test_config();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        assert_eq!(toolbox.invoke("calculator", "45 * 67").await.unwrap(), "3015");
    }

    #[tokio::test]
    async fn control_characters_rejected() {
        let (embedding, tools) = test_config();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        assert!(matches!(
            toolbox.invoke("text_analysis", "abc\u{0000}def").await,
            Err(ToolError::InvalidInput(_))
        ));
    }
}
