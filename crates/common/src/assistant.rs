//! Query facade used by the HTTP layer
//!
//! Owns both question-answering pipelines. Either pipeline may fail to load
//! (no index yet, missing dataset); the other keeps serving and calls to the
//! missing one return `ComponentUnavailable`.

use crate::config::AppConfig;
use crate::context::{AnswerSynthesizer, Retriever};
use crate::embeddings::{create_embedder, Embedder};
use crate::errors::{AppError, Result};
use crate::index::VectorIndex;
use crate::llm::{create_engine, GenerationOptions, ReasoningEngine};
use crate::metrics::QueryMetrics;
use crate::models::{Chunk, Citation, QueryResult};
use crate::tabular::{DataView, NlQueryTranslator, Sandbox, Table, TableView};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Retrieval plus synthesis over the policy index
pub struct PolicyPipeline {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl PolicyPipeline {
    pub fn new(retriever: Retriever, synthesizer: AnswerSynthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }
}

/// Translation plus sandboxed execution over the employee table
pub struct DataPipeline {
    table: Arc<Table>,
    translator: NlQueryTranslator,
}

impl DataPipeline {
    pub fn new(table: Arc<Table>, translator: NlQueryTranslator) -> Self {
        Self { table, translator }
    }
}

/// Load state reported by readiness checks
#[derive(Debug, Clone, Serialize)]
pub struct AssistantStatus {
    pub policy_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_error: Option<String>,
    pub data_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_error: Option<String>,
}

pub struct Assistant {
    policy: std::result::Result<PolicyPipeline, String>,
    data: std::result::Result<DataPipeline, String>,
}

impl Assistant {
    /// Assemble from pipelines; failed ones are kept as unavailable
    pub fn new(policy: Result<PolicyPipeline>, data: Result<DataPipeline>) -> Self {
        let policy = policy.map_err(|e| {
            warn!(error = %e, "Policy question answering unavailable");
            e.to_string()
        });
        let data = data.map_err(|e| {
            warn!(error = %e, "Data question answering unavailable");
            e.to_string()
        });
        Self { policy, data }
    }

    /// Build both pipelines from configuration.
    ///
    /// Backend construction errors are fatal. Index and dataset load errors
    /// only disable the pipeline that needs them.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let engine = create_engine(&config.reasoning)?;
        Ok(Self::with_backends(config, embedder, engine))
    }

    pub fn with_backends(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        engine: Arc<dyn ReasoningEngine>,
    ) -> Self {
        let options = GenerationOptions::from(&config.reasoning);

        let policy = VectorIndex::open_or_bootstrap(
            &config.paths.index_dir,
            embedder.model_name(),
            embedder.dimension(),
            config.retrieval.bootstrap_empty,
        )
        .and_then(|index| Retriever::new(embedder, Arc::new(index), config.retrieval.k))
        .map(|retriever| {
            PolicyPipeline::new(
                retriever,
                AnswerSynthesizer::new(engine.clone(), options.clone()),
            )
        });

        let data = Table::from_csv_path(&config.paths.dataset).map(|table| {
            let sandbox = Sandbox::new(config.execution_timeout(), config.tabular.max_rows);
            DataPipeline::new(
                Arc::new(table),
                NlQueryTranslator::new(engine, options, sandbox, config.tabular.sample_rows),
            )
        });

        Self::new(policy, data)
    }

    fn policy(&self) -> Result<&PolicyPipeline> {
        self.policy
            .as_ref()
            .map_err(|reason| AppError::ComponentUnavailable {
                component: "policy index",
                reason: reason.clone(),
            })
    }

    fn data(&self) -> Result<&DataPipeline> {
        self.data
            .as_ref()
            .map_err(|reason| AppError::ComponentUnavailable {
                component: "employee dataset",
                reason: reason.clone(),
            })
    }

    /// Answer a policy question with the configured `k`
    pub async fn ask_policy(&self, question: &str) -> Result<QueryResult> {
        self.ask_policy_with_k(question, None).await
    }

    #[instrument(skip(self))]
    pub async fn ask_policy_with_k(&self, question: &str, k: Option<usize>) -> Result<QueryResult> {
        let metrics = QueryMetrics::start("policy");
        let result = self.answer_policy(question, k).await;
        metrics.finish(result.is_ok());
        result
    }

    async fn answer_policy(&self, question: &str, k: Option<usize>) -> Result<QueryResult> {
        let question = non_empty(question)?;
        let policy = self.policy()?;

        let k = k.unwrap_or_else(|| policy.retriever.default_k());
        let chunks: Vec<Chunk> = policy
            .retriever
            .retrieve(question, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();

        let synthesized = policy.synthesizer.synthesize(question, &chunks).await?;
        info!(citations = synthesized.sources.len(), "Policy question answered");

        Ok(QueryResult {
            answer: synthesized.answer,
            citations: synthesized.sources.iter().map(Citation::from).collect(),
        })
    }

    /// Answer an analytic question over the employee table
    #[instrument(skip(self))]
    pub async fn ask_data(&self, question: &str) -> Result<QueryResult> {
        let metrics = QueryMetrics::start("data");
        let result = self.answer_data(question).await;
        metrics.finish(result.is_ok());
        result
    }

    async fn answer_data(&self, question: &str) -> Result<QueryResult> {
        let question = non_empty(question)?;
        let data = self.data()?;
        let answer = data.translator.translate(question, data.table.clone()).await?;
        Ok(QueryResult::answer_only(answer.answer))
    }

    /// Read-only view of the dataset
    pub fn view(&self, view: DataView) -> Result<TableView> {
        view.render(&self.data()?.table)
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            policy_ready: self.policy.is_ok(),
            index_entries: self.policy.as_ref().ok().map(|p| p.retriever.index().len()),
            policy_error: self.policy.as_ref().err().cloned(),
            data_ready: self.data.is_ok(),
            table_rows: self.data.as_ref().ok().map(|d| d.table.len()),
            data_error: self.data.as_ref().err().cloned(),
        }
    }
}

fn non_empty(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            message: "question must not be empty".to_string(),
            field: Some("question".to_string()),
        });
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::models::{IndexEntry, SourceMetadata};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Replies with the text of the first context block
    struct EchoFirstChunk;

    #[async_trait]
    impl ReasoningEngine for EchoFirstChunk {
        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
            let block = prompt
                .find("[1] ")
                .map(|i| &prompt[i..])
                .and_then(|rest| rest.split_once('\n'))
                .map(|(_, body)| body.split("\n\n").next().unwrap_or(body))
                .unwrap_or_default();
            Ok(block.to_string())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FixedEngine(&'static str);

    #[async_trait]
    impl ReasoningEngine for FixedEngine {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    const REMOTE_SENTENCE: &str = "Employees may work remotely up to 3 days per week.";

    async fn policy_pipeline() -> PolicyPipeline {
        let embedder = Arc::new(HashingEmbedder::new(384));
        let mut index = VectorIndex::new(embedder.model_name(), embedder.dimension());
        let vector = embedder.embed(REMOTE_SENTENCE).await.unwrap();
        index
            .add(vec![IndexEntry {
                vector,
                chunk: Chunk {
                    id: "remote-0".to_string(),
                    source_document_id: "remote".to_string(),
                    source: SourceMetadata {
                        path: PathBuf::from("/srv/policies/remote_policy.pdf"),
                        page: 1,
                    },
                    text: REMOTE_SENTENCE.to_string(),
                    sequence_index: 0,
                },
            }])
            .unwrap();

        let retriever = Retriever::new(embedder, Arc::new(index), 3).unwrap();
        PolicyPipeline::new(
            retriever,
            AnswerSynthesizer::new(Arc::new(EchoFirstChunk), GenerationOptions::default()),
        )
    }

    fn data_pipeline(reply: &'static str) -> DataPipeline {
        let table = Table::from_reader(
            "Name,Department,Salary\nAda,Eng,100\nGrace,Eng,200\nLinus,HR,150\n".as_bytes(),
        )
        .unwrap();
        DataPipeline::new(
            Arc::new(table),
            NlQueryTranslator::new(
                Arc::new(FixedEngine(reply)),
                GenerationOptions::default(),
                Sandbox::new(Duration::from_secs(1), 1000),
                5,
            ),
        )
    }

    fn missing_index() -> AppError {
        AppError::IndexNotFound {
            path: "data/index".to_string(),
            reason: "manifest.json unreadable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ask_policy_end_to_end() {
        let assistant = Assistant::new(
            Ok(policy_pipeline().await),
            Err(AppError::Dataset {
                message: "not loaded".to_string(),
            }),
        );

        let result = assistant.ask_policy("remote work policy").await.unwrap();
        assert!(result.answer.contains(REMOTE_SENTENCE));
        assert_eq!(result.citations[0].source_label, "remote_policy.pdf");
        assert_eq!(result.citations[0].page, Some(1));
    }

    #[tokio::test]
    async fn test_ask_data_group_by() {
        let assistant = Assistant::new(
            Err(missing_index()),
            Ok(data_pipeline(
                r#"{"group_by": "Department", "operation": {"op": "mean", "column": "Salary"}}"#,
            )),
        );

        let result = assistant
            .ask_data("average salary by department")
            .await
            .unwrap();
        assert!(result.answer.contains("Eng: 150"));
        assert!(result.answer.contains("HR: 150"));
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn test_missing_component_is_reported() {
        let assistant = Assistant::new(Err(missing_index()), Ok(data_pipeline("{}")));

        let err = assistant.ask_policy("remote work policy").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ComponentUnavailable {
                component: "policy index",
                ..
            }
        ));

        let status = assistant.status();
        assert!(!status.policy_ready);
        assert_eq!(status.table_rows, Some(3));
        assert!(assistant.view(DataView::Staff).is_ok());
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let assistant = Assistant::new(Ok(policy_pipeline().await), Ok(data_pipeline("{}")));
        assert!(matches!(
            assistant.ask_policy("   ").await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_without_artifacts() {
        let root = std::env::temp_dir().join(format!("hrdesk-{}", uuid::Uuid::new_v4()));
        let mut config = AppConfig::default();
        config.paths.index_dir = root.join("index");
        config.paths.dataset = root.join("employees.csv");
        config.embedding.provider = "hashing".to_string();

        let assistant = Assistant::from_config(&config).unwrap();
        let status = assistant.status();
        assert!(!status.policy_ready);
        assert!(!status.data_ready);
    }
}
