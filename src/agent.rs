//! Think/act/observe reasoning loop.
//!
//! Each turn the language model either picks a tool (Thought, Action,
//! Action Input) or stops (Thought, Final Answer). The loop executes the
//! tool, feeds the observation back, and repeats until a final answer, the
//! iteration cap, or the parse-retry budget. Tool failures become
//! observations rather than aborting the query, so the model can recover
//! by trying a different tool or input.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{AgentError, ToolError};
use crate::models::{Interaction, ReasoningStep};
use crate::tools::Toolbox;

/// Language-model collaborator. The loop only needs one completion call;
/// tests substitute a scripted implementation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AgentError>;
}

/// The loop's result: the answer plus the full trace behind it.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    pub steps: Vec<ReasoningStep>,
    pub tools_used: Vec<String>,
}

/// One parsed model turn.
#[derive(Debug, PartialEq)]
enum ModelTurn {
    Action {
        thought: Option<String>,
        tool: String,
        input: String,
    },
    Final {
        thought: Option<String>,
        answer: String,
    },
}

/// Run the reasoning loop for one query.
pub async fn run(
    llm: &dyn LlmClient,
    toolbox: &Toolbox<'_>,
    config: &LlmConfig,
    query: &str,
    history: &[Interaction],
) -> Result<AgentOutcome, AgentError> {
    let system = system_prompt(toolbox);
    let mut transcript = opening_prompt(query, history);

    let mut steps: Vec<ReasoningStep> = Vec::new();
    let mut tools_used: Vec<String> = Vec::new();
    let mut parse_failures = 0u32;

    for iteration in 0..config.max_iterations {
        let response = llm.complete(&system, &transcript).await?;
        debug!(iteration, response_len = response.len(), "model turn");

        match parse_model_turn(&response) {
            Ok(ModelTurn::Final { thought, answer }) => {
                if let Some(text) = thought {
                    steps.push(ReasoningStep::Thought { text });
                }
                steps.push(ReasoningStep::FinalAnswer {
                    text: answer.clone(),
                });
                return Ok(AgentOutcome {
                    answer,
                    steps,
                    tools_used,
                });
            }
            Ok(ModelTurn::Action {
                thought,
                tool,
                input,
            }) => {
                if let Some(text) = &thought {
                    steps.push(ReasoningStep::Thought { text: text.clone() });
                }
                steps.push(ReasoningStep::Action {
                    tool: tool.clone(),
                    input: input.clone(),
                });

                let observation = match toolbox.invoke(&tool, &input).await {
                    Ok(output) => {
                        if !tools_used.contains(&tool) {
                            tools_used.push(tool.clone());
                        }
                        output
                    }
                    Err(e) => observation_for_error(&e),
                };
                steps.push(ReasoningStep::Observation {
                    text: observation.clone(),
                });

                transcript.push_str(&format!(
                    "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
                    thought.unwrap_or_default(),
                    tool,
                    input,
                    observation
                ));
            }
            Err(parse_err) => {
                parse_failures += 1;
                warn!(parse_failures, "malformed model turn");
                if parse_failures > config.max_parse_retries {
                    return Err(parse_err);
                }
                let nudge = "Your last response could not be parsed. Reply with either \
                             'Thought:' followed by 'Action:' and 'Action Input:' lines, \
                             or 'Thought:' followed by 'Final Answer:'.";
                steps.push(ReasoningStep::Observation {
                    text: nudge.to_string(),
                });
                transcript.push_str(&format!("Observation: {}\n", nudge));
            }
        }
    }

    // Iteration cap reached. If tools produced observations, hand back a
    // best-effort answer built from the last one; otherwise fail.
    let last_observation = steps.iter().rev().find_map(|s| match s {
        ReasoningStep::Observation { text } => Some(text.clone()),
        _ => None,
    });
    match last_observation {
        Some(obs) if !tools_used.is_empty() => {
            let answer = format!(
                "I could not finish reasoning about this question within the step limit. \
                 The most relevant information found was:\n{}",
                obs
            );
            steps.push(ReasoningStep::FinalAnswer {
                text: answer.clone(),
            });
            Ok(AgentOutcome {
                answer,
                steps,
                tools_used,
            })
        }
        _ => Err(AgentError::IterationLimitExceeded(config.max_iterations)),
    }
}

fn observation_for_error(err: &ToolError) -> String {
    format!("Error: {}. Adjust the tool or input and try again.", err)
}

fn system_prompt(toolbox: &Toolbox<'_>) -> String {
    format!(
        "You are a document question-answering assistant. Answer using the \
         tools below; prefer document_search for anything the loaded document \
         might cover.\n\nTools:\n{}\n\n\
         Respond in exactly one of these two forms:\n\n\
         Thought: what you are considering\n\
         Action: tool name\n\
         Action Input: the tool input\n\n\
         or\n\n\
         Thought: what you concluded\n\
         Final Answer: the answer for the user\n",
        toolbox.render_catalogue()
    )
}

fn opening_prompt(query: &str, history: &[Interaction]) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for interaction in history {
            prompt.push_str(&format!(
                "User: {}\nAssistant: {}\n",
                interaction.query, interaction.answer
            ));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Question: {}\n", query));
    prompt
}

// ============ Turn parsing ============

/// Parse a model turn. Markers are matched case-insensitively at line
/// starts with surrounding whitespace tolerated, but must appear in the
/// prompted order (Thought before Action before Action Input, or Thought
/// before Final Answer). A missing Thought is tolerated since some models
/// skip it; the final answer or action input may span multiple lines.
fn parse_model_turn(response: &str) -> Result<ModelTurn, AgentError> {
    let thought_at = marker_offset(response, "Thought:");
    let thought = capture(response, "Thought:", &["Action:", "Final Answer:"]);

    if let Some(final_at) = marker_offset(response, "Final Answer:") {
        if thought_at.is_some_and(|t| t > final_at) {
            return Err(AgentError::ReasoningParseError(
                "Thought after Final Answer".to_string(),
            ));
        }
        let answer = capture(response, "Final Answer:", &[]).unwrap_or_default();
        if answer.is_empty() {
            return Err(AgentError::ReasoningParseError(
                "empty final answer".to_string(),
            ));
        }
        return Ok(ModelTurn::Final { thought, answer });
    }

    match (
        marker_offset(response, "Action:"),
        marker_offset(response, "Action Input:"),
    ) {
        (Some(action_at), Some(input_at)) => {
            if input_at < action_at || thought_at.is_some_and(|t| t > action_at) {
                return Err(AgentError::ReasoningParseError(
                    "labels out of order".to_string(),
                ));
            }
            let tool = capture(response, "Action:", &["Action Input:", "Observation:"])
                .unwrap_or_default();
            if tool.is_empty() {
                return Err(AgentError::ReasoningParseError(
                    "empty tool name".to_string(),
                ));
            }
            let input = capture(response, "Action Input:", &["Observation:"]).unwrap_or_default();
            Ok(ModelTurn::Action {
                thought,
                tool,
                input,
            })
        }
        (Some(_), None) => Err(AgentError::ReasoningParseError(
            "Action without Action Input".to_string(),
        )),
        _ => Err(AgentError::ReasoningParseError(
            "no Action or Final Answer found".to_string(),
        )),
    }
}

/// Offset of `marker`, matched case-insensitively at the start of a line
/// (leading whitespace allowed).
fn marker_offset(response: &str, marker: &str) -> Option<usize> {
    let lower = response.to_ascii_lowercase();
    let marker_lower = marker.to_ascii_lowercase();

    for (offset, _) in lower.match_indices(&marker_lower) {
        let line_start = lower[..offset].rfind('\n').map(|nl| nl + 1).unwrap_or(0);
        if lower[line_start..offset].trim().is_empty() {
            return Some(offset);
        }
    }
    None
}

/// Text following `marker` up to the next of `terminators` or the end of
/// the response, trimmed.
fn capture(response: &str, marker: &str, terminators: &[&str]) -> Option<String> {
    let start = marker_offset(response, marker)? + marker.len();
    let lower = response.to_ascii_lowercase();

    let mut end = response.len();
    for terminator in terminators {
        if let Some(pos) = lower[start..].find(&terminator.to_ascii_lowercase()) {
            end = end.min(start + pos);
        }
    }

    Some(response[start..end].trim().to_string())
}

// ============ OpenAI chat client ============

/// `POST /v1/chat/completions` with the same retry/backoff policy as the
/// embedding client: 429 and 5xx retry with exponential backoff, other
/// 4xx fail immediately.
pub struct OpenAiChat {
    config: LlmConfig,
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::Llm("OPENAI_API_KEY not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Llm(format!("could not build HTTP client: {}", e)))?;
        Ok(Self {
            config: config.clone(),
            client,
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AgentError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| AgentError::Llm(format!("invalid response: {}", e)))?;
                        return json
                            .get("choices")
                            .and_then(|c| c.get(0))
                            .and_then(|c| c.get("message"))
                            .and_then(|m| m.get("content"))
                            .and_then(|c| c.as_str())
                            .map(|s| s.to_string())
                            .ok_or_else(|| {
                                AgentError::Llm("response missing message content".to_string())
                            });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(AgentError::Llm(format!(
                            "API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(AgentError::Llm(format!(
                        "API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(AgentError::Llm(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AgentError::Llm("request failed after retries".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, ToolsConfig};
    use std::sync::Mutex;

    /// Replays a fixed script of model turns.
    struct ScriptedLlm {
        turns: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(turns: &[&str]) -> Self {
            let mut turns: Vec<String> = turns.iter().map(|s| s.to_string()).collect();
            turns.reverse();
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AgentError> {
            self.turns
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AgentError::Llm("script exhausted".to_string()))
        }
    }

    fn config() -> LlmConfig {
        LlmConfig {
            max_iterations: 5,
            max_parse_retries: 2,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn tool_call_then_final_answer() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        let llm = ScriptedLlm::new(&[
            "Thought: I should compute this.\nAction: calculator\nAction Input: 45 * 67",
            "Thought: I have the result.\nFinal Answer: The product is 3015.",
        ]);

        let outcome = run(&llm, &toolbox, &config(), "What is 45 * 67?", &[])
            .await
            .unwrap();
        assert_eq!(outcome.answer, "The product is 3015.");
        assert_eq!(outcome.tools_used, vec!["calculator".to_string()]);
        assert!(outcome
            .steps
            .iter()
            .any(|s| matches!(s, ReasoningStep::Observation { text } if text == "3015")));
    }

    #[tokio::test]
    async fn direct_final_answer_uses_no_tools() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        let llm = ScriptedLlm::new(&["Thought: Simple greeting.\nFinal Answer: Hello!"]);

        let outcome = run(&llm, &toolbox, &config(), "hi", &[]).await.unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert!(outcome.tools_used.is_empty());
    }

    #[tokio::test]
    async fn tool_error_becomes_observation_and_loop_recovers() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        let llm = ScriptedLlm::new(&[
            "Thought: Try this.\nAction: calculator\nAction Input: 100 / 0",
            "Thought: Division by zero is undefined.\nFinal Answer: That is undefined.",
        ]);

        let outcome = run(&llm, &toolbox, &config(), "100 / 0?", &[]).await.unwrap();
        assert_eq!(outcome.answer, "That is undefined.");
        assert!(outcome
            .steps
            .iter()
            .any(|s| matches!(s, ReasoningStep::Observation { text } if text.contains("division by zero"))));
    }

    #[tokio::test]
    async fn malformed_turns_exhaust_parse_budget() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        let llm = ScriptedLlm::new(&["gibberish", "more gibberish", "still gibberish"]);

        let err = run(&llm, &toolbox, &config(), "anything", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ReasoningParseError(_)));
    }

    #[tokio::test]
    async fn never_answering_model_terminates() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        // Always acts, never finishes.
        let turn = "Thought: Keep computing.\nAction: calculator\nAction Input: 1 + 1";
        let llm = ScriptedLlm::new(&[turn, turn, turn, turn, turn, turn, turn]);

        let outcome = run(&llm, &toolbox, &config(), "loop forever", &[])
            .await
            .unwrap();
        assert!(outcome.answer.contains("step limit"));
        assert!(outcome.steps.len() <= 5 * 3 + 1);
    }

    #[tokio::test]
    async fn unparseable_forever_without_tools_fails() {
        let embedding = EmbeddingConfig::default();
        let tools = ToolsConfig::default();
        let toolbox = Toolbox {
            index: None,
            embedding: &embedding,
            top_k: 4,
            tools: &tools,
        };
        let cfg = LlmConfig {
            max_iterations: 2,
            max_parse_retries: 10,
            ..LlmConfig::default()
        };
        let llm = ScriptedLlm::new(&["nope", "nope"]);

        let err = run(&llm, &toolbox, &cfg, "anything", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::IterationLimitExceeded(2)));
    }

    #[test]
    fn parse_action_turn() {
        let turn = parse_model_turn(
            "Thought: search it\nAction: document_search\nAction Input: databases mentioned",
        )
        .unwrap();
        assert_eq!(
            turn,
            ModelTurn::Action {
                thought: Some("search it".to_string()),
                tool: "document_search".to_string(),
                input: "databases mentioned".to_string(),
            }
        );
    }

    #[test]
    fn parse_is_case_and_whitespace_tolerant() {
        let turn = parse_model_turn(
            "  thought: ok\n  ACTION: Calculator\n  action input: 1 + 2\n",
        )
        .unwrap();
        assert!(matches!(turn, ModelTurn::Action { tool, .. } if tool == "Calculator"));
    }

    #[test]
    fn parse_multiline_final_answer() {
        let turn =
            parse_model_turn("Thought: done\nFinal Answer: First line.\nSecond line.").unwrap();
        assert_eq!(
            turn,
            ModelTurn::Final {
                thought: Some("done".to_string()),
                answer: "First line.\nSecond line.".to_string(),
            }
        );
    }

    #[test]
    fn parse_rejects_action_without_input() {
        assert!(parse_model_turn("Action: calculator").is_err());
        assert!(parse_model_turn("random text with no markers").is_err());
    }

    #[test]
    fn parse_rejects_out_of_order_labels() {
        assert!(parse_model_turn("Action Input: 1 + 2\nAction: calculator").is_err());
        assert!(parse_model_turn("Final Answer: done\nThought: second guess").is_err());
        assert!(
            parse_model_turn("Action: calculator\nThought: late\nAction Input: 1 + 2").is_err()
        );
    }

    #[test]
    fn parse_tolerates_missing_thought() {
        let turn = parse_model_turn("Action: calculator\nAction Input: 1 + 2").unwrap();
        assert_eq!(
            turn,
            ModelTurn::Action {
                thought: None,
                tool: "calculator".to_string(),
                input: "1 + 2".to_string(),
            }
        );
    }
}
