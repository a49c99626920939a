//! Natural-language to tabular computation translator

use super::computation::{Computation, ComputationOutput};
use super::sandbox::Sandbox;
use super::table::Table;
use super::TranslationPhase;
use crate::errors::{AppError, Result};
use crate::llm::{generate_with_timeout, GenerationOptions, ReasoningEngine};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const LANGUAGE_REFERENCE: &str = r#"Reply with a single JSON object and nothing else:
{
  "filters": [{"column": "<column>", "op": "eq|ne|gt|gte|lt|lte|contains", "value": <string or number>}],
  "group_by": "<column>" or null,
  "operation": {"op": "count"}
             | {"op": "sum|mean|median|min|max", "column": "<number column>"}
             | {"op": "count_distinct", "column": "<column>"}
             | {"op": "list", "columns": ["<column>", ...]},
  "order": "asc" | "desc" | null,
  "limit": <integer> or null
}
Use only the columns listed in the schema. "filters", "group_by", "order" and "limit" may be omitted."#;

/// Answer to a data question with the computation that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularAnswer {
    pub answer: String,
    pub computation: Computation,
    pub output: ComputationOutput,
}

/// Translates questions into computations and runs them in the sandbox
pub struct NlQueryTranslator {
    engine: Arc<dyn ReasoningEngine>,
    options: GenerationOptions,
    sandbox: Sandbox,
    sample_rows: usize,
}

impl NlQueryTranslator {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        options: GenerationOptions,
        sandbox: Sandbox,
        sample_rows: usize,
    ) -> Self {
        Self {
            engine,
            options,
            sandbox,
            sample_rows,
        }
    }

    pub fn build_prompt(&self, question: &str, table: &Table) -> String {
        format!(
            "You translate questions about an employee table into a computation.\n\n\
             {}\n\nSchema ({} rows):\n{}\n\nSample rows:\n{}\n\nQuestion: {}\nJSON:",
            LANGUAGE_REFERENCE,
            table.len(),
            table.schema_description(),
            table.sample(self.sample_rows),
            question.trim()
        )
    }

    /// Translate and execute one question.
    ///
    /// Moves through `Idle -> Translating -> Executing -> Succeeded`; any
    /// failure ends in `Failed` with no partial output. Engine errors are
    /// returned as-is.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub async fn translate(&self, question: &str, table: Arc<Table>) -> Result<TabularAnswer> {
        let mut phase = TranslationPhase::Idle;
        let result = self.run(question, table, &mut phase).await;

        match &result {
            Ok(_) => {
                phase = TranslationPhase::Succeeded;
                info!(%phase, "Translation complete");
            }
            Err(AppError::TranslationFailed { kind, reason, .. }) => {
                metrics::record_translation_rejected(kind.as_str());
                warn!(failed_while = %phase, %kind, reason = %reason, "Translation failed");
            }
            Err(e) => {
                warn!(failed_while = %phase, error = %e, "Translation failed");
            }
        }
        result
    }

    async fn run(
        &self,
        question: &str,
        table: Arc<Table>,
        phase: &mut TranslationPhase,
    ) -> Result<TabularAnswer> {
        *phase = TranslationPhase::Translating;
        let prompt = self.build_prompt(question, &table);
        let reply = generate_with_timeout(self.engine.as_ref(), &prompt, &self.options).await?;
        debug!(reply = %reply, "Engine reply");

        let computation = Arc::new(Sandbox::admit(&reply, &table)?);

        *phase = TranslationPhase::Executing;
        let output = self.sandbox.execute(computation.clone(), table).await?;

        Ok(TabularAnswer {
            answer: computation.render(&output),
            computation: Arc::try_unwrap(computation).unwrap_or_else(|shared| (*shared).clone()),
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::{TranslationFailureKind, Value};
    use async_trait::async_trait;
    use std::time::Duration;

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

    fn translator(reply: &'static str) -> NlQueryTranslator {
        NlQueryTranslator::new(
            Arc::new(FixedEngine(reply)),
            GenerationOptions::default(),
            Sandbox::new(Duration::from_secs(1), 1000),
            5,
        )
    }

    fn departments() -> Arc<Table> {
        Arc::new(
            Table::from_reader("Dept,Salary\nEng,100\nEng,200\nHR,150\n".as_bytes()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_group_by_average_salary() {
        let translator = translator(
            r#"{"group_by": "Dept", "operation": {"op": "mean", "column": "Salary"}}"#,
        );
        let answer = translator
            .translate("What is the average salary per department?", departments())
            .await
            .unwrap();

        assert_eq!(answer.output.group("Eng"), Some(&Value::Number(150.0)));
        assert_eq!(answer.output.group("HR"), Some(&Value::Number(150.0)));
        assert!(answer.answer.contains("Eng: 150"));
    }

    #[tokio::test]
    async fn test_unsafe_reply_never_executes() {
        let translator = translator("import os\nos.remove('/etc/hosts')");
        let err = translator
            .translate("delete the data", departments())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::TranslationFailed {
                phase: TranslationPhase::Translating,
                kind: TranslationFailureKind::Unsafe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_structured() {
        let translator = translator(r#"{"operation": {"op": "max", "column": "Bonus"}}"#);
        let err = translator
            .translate("highest bonus?", departments())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::TranslationFailed {
                kind: TranslationFailureKind::SchemaMismatch,
                ..
            }
        ));
    }

    #[test]
    fn test_prompt_lists_schema_and_sample() {
        let translator = translator("{}");
        let prompt = translator.build_prompt("headcount?", &departments());
        assert!(prompt.contains("- Salary (number)"));
        assert!(prompt.contains("Eng, 100"));
        assert!(prompt.ends_with("Question: headcount?\nJSON:"));
    }
}
