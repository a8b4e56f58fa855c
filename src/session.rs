//! Ties the subsystems into one conversational session: the persisted
//! vector index, the interaction log, and the reasoning loop.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::agent::{self, LlmClient};
use crate::config::Config;
use crate::db;
use crate::error::AgentError;
use crate::index::VectorIndex;
use crate::ingest;
use crate::memory::MemoryStore;
use crate::models::{IngestSummary, Interaction};
use crate::tools::Toolbox;

pub struct Session {
    config: Config,
    pool: SqlitePool,
    index: Option<VectorIndex>,
    memory: MemoryStore,
}

impl Session {
    /// Open the session: connect storage, reload any persisted index, and
    /// load the interaction log.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config.storage.index_path).await?;
        db::ensure_schema(&pool).await?;

        let index = VectorIndex::load(&pool).await?;
        if let Some(index) = &index {
            info!(
                documents = index.documents().len(),
                chunks = index.len(),
                "restored persisted index"
            );
        }

        let memory = MemoryStore::open(&config.storage.memory_path);

        Ok(Self {
            config,
            pool,
            index,
            memory,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Ingest a file and persist the resulting index. The previous index
    /// stays active until the new one is fully built, so a failed
    /// ingestion changes nothing.
    pub async fn ingest_file(&mut self, path: &Path, append: bool) -> Result<IngestSummary> {
        let (index, summary) =
            ingest::ingest_file(path, &self.config, self.index.clone(), append).await?;
        index.save(&self.pool).await?;
        self.index = Some(index);
        Ok(summary)
    }

    /// Answer a query through the reasoning loop and record the
    /// interaction. A memory write failure is reported but does not lose
    /// the answer.
    pub async fn ask(&mut self, query: &str, llm: &dyn LlmClient) -> Result<Interaction> {
        let toolbox = Toolbox {
            index: self.index.as_ref(),
            embedding: &self.config.embedding,
            top_k: self.config.retrieval.top_k,
            tools: &self.config.tools,
        };
        let history: Vec<Interaction> = self
            .memory
            .window(self.config.memory.window_size)
            .to_vec();

        let outcome = match agent::run(llm, &toolbox, &self.config.llm, query, &history).await {
            Ok(outcome) => outcome,
            // A loop that ran out of budget still yields a recorded answer;
            // only model-call failures abort the query.
            Err(err @ AgentError::ReasoningParseError(_))
            | Err(err @ AgentError::IterationLimitExceeded(_)) => {
                warn!(error = %err, "reasoning loop gave up");
                agent::AgentOutcome {
                    answer: format!("I was unable to answer this question: {}.", err),
                    steps: Vec::new(),
                    tools_used: Vec::new(),
                }
            }
            Err(err) => return Err(err.into()),
        };

        let interaction = Interaction {
            timestamp: Utc::now(),
            query: query.to_string(),
            answer: outcome.answer,
            steps: outcome.steps,
            tools_used: outcome.tools_used,
            feedback: None,
            feedback_at: None,
        };
        self.memory.append(interaction.clone())?;
        Ok(interaction)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

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

    fn test_config(dir: &Path) -> Config {
        let toml_str = format!(
            r#"
            [storage]
            index_path = "{}/index.sqlite"
            memory_path = "{}/memory.json"

            [chunking]
            chunk_size = 200
            overlap = 40

            [embedding]
            provider = "hashed"
            dims = 128
            "#,
            dir.display(),
            dir.display()
        );
        toml::from_str(&toml_str).unwrap()
    }

    #[tokio::test]
    async fn ingest_ask_and_remember() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("infra.txt");
        std::fs::write(
            &file,
            "Postgres handles durable storage.\n\nRedis caches hot keys.",
        )
        .unwrap();

        let mut session = Session::open(test_config(tmp.path())).await.unwrap();
        let summary = session.ingest_file(&file, false).await.unwrap();
        assert!(summary.chunks >= 1);

        let llm = ScriptedLlm::new(&[
            "Thought: Search the document.\nAction: document_search\nAction Input: storage",
            "Thought: Found it.\nFinal Answer: Postgres handles durable storage.",
        ]);
        let interaction = session.ask("What handles storage?", &llm).await.unwrap();
        assert!(interaction.answer.contains("Postgres"));
        assert_eq!(interaction.tools_used, vec!["document_search".to_string()]);
        assert_eq!(session.memory().len(), 1);

        session.close().await;
    }

    /// Answers immediately and records every prompt it was shown.
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, AgentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Thought: done\nFinal Answer: Postgres and Redis.".to_string())
        }
    }

    #[tokio::test]
    async fn follow_up_question_sees_prior_interaction() {
        let tmp = TempDir::new().unwrap();
        let mut session = Session::open(test_config(tmp.path())).await.unwrap();
        let llm = RecordingLlm {
            prompts: Mutex::new(Vec::new()),
        };

        session
            .ask("What databases are mentioned?", &llm)
            .await
            .unwrap();
        session.ask("Compare them", &llm).await.unwrap();

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[1].contains("What databases are mentioned?"));
        assert!(prompts[1].contains("Postgres and Redis."));

        session.close().await;
    }

    #[tokio::test]
    async fn unparseable_model_degrades_to_recorded_answer() {
        let tmp = TempDir::new().unwrap();
        let mut session = Session::open(test_config(tmp.path())).await.unwrap();

        let llm = ScriptedLlm::new(&["junk", "junk", "junk", "junk", "junk"]);
        let interaction = session.ask("anything", &llm).await.unwrap();
        assert!(interaction.answer.contains("unable to answer"));
        assert_eq!(session.memory().len(), 1);

        session.close().await;
    }

    #[tokio::test]
    async fn index_survives_session_restart() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "A body of text long enough to chunk and search.").unwrap();

        let config = test_config(tmp.path());
        let mut session = Session::open(config.clone()).await.unwrap();
        session.ingest_file(&file, false).await.unwrap();
        let chunks = session.index().unwrap().len();
        session.close().await;

        let reopened = Session::open(config).await.unwrap();
        assert_eq!(reopened.index().unwrap().len(), chunks);
        reopened.close().await;
    }
}
