use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use r2d2::Pool;
use tempfile::TempDir;

use nl_viz::config::DatabaseConfig;
use nl_viz::db::pool::{build_pool, DuckdbConnectionManager};
use nl_viz::llm::translator::Translator;
use nl_viz::llm::{LlmError, LlmManager, SqlGenerator};
use nl_viz::Orchestrator;

/// Generator that replays scripted completions and records every invocation,
/// so tests can assert call ordering and prompt context without a model.
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn recorded_contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate_sql(&self, _question: &str, context: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());

        match self.script.lock().unwrap().pop_front() {
            Some(Ok(sql)) => Ok(sql),
            Some(Err(reason)) => Err(LlmError::ResponseError(reason)),
            None => Err(LlmError::ResponseError("script exhausted".to_string())),
        }
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    generator: &'static ScriptedGenerator,
    _dir: TempDir,
}

/// Builds an orchestrator over a seeded on-disk DuckDB and a scripted
/// generator. The generator is leaked so both the translator and the test
/// can hold it.
fn fixture(script: Vec<Result<String, String>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sales.duckdb");

    let conn = duckdb::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sales (category VARCHAR, region VARCHAR, total_sales INTEGER, sold_at TIMESTAMP);
         INSERT INTO sales VALUES
           ('Electronics', 'North', 1200, '2024-01-05 10:00:00'),
           ('Clothing',    'South', 800,  '2024-01-06 11:30:00'),
           ('Groceries',   'North', 450,  '2024-01-07 09:15:00');",
    )
    .unwrap();
    drop(conn);

    let generator: &'static ScriptedGenerator = Box::leak(Box::new(ScriptedGenerator::new(script)));

    struct Shared(&'static ScriptedGenerator);

    #[async_trait]
    impl SqlGenerator for Shared {
        async fn generate_sql(&self, question: &str, context: &str) -> Result<String, LlmError> {
            self.0.generate_sql(question, context).await
        }
    }

    let config = DatabaseConfig {
        connection_string: db_path.to_string_lossy().to_string(),
        pool_size: 2,
    };
    let db_pool: Pool<DuckdbConnectionManager> = build_pool(&config).unwrap();
    let translator = Translator::new(LlmManager::with_generator(Box::new(Shared(generator))));

    Fixture {
        orchestrator: Orchestrator::with_components(db_pool, translator),
        generator,
        _dir: dir,
    }
}

#[tokio::test]
async fn successful_turn_returns_data_and_bar_chart() {
    let fx = fixture(vec![Ok(
        "SELECT category, SUM(total_sales) AS total_sales FROM sales GROUP BY category ORDER BY category".to_string(),
    )]);

    let response = fx.orchestrator.process("Show total sales by category", false).await;

    assert!(response.success, "unexpected failure: {:?}", response.error);
    assert_eq!(response.row_count, 3);
    assert_eq!(response.columns, vec!["category", "total_sales"]);
    assert_eq!(response.error, None);
    assert_eq!(response.visualization_type.as_deref(), Some("bar"));

    let summary = response.visualization_spec.unwrap();
    assert_eq!(summary["x_column"], "category");
    assert_eq!(summary["y_columns"][0], "total_sales");

    let spec = response.chart_spec.unwrap();
    let rendered = serde_json::to_value(&spec).unwrap();
    assert_eq!(rendered["mark"], "bar");
    assert_eq!(rendered["encoding"]["x"]["field"], "category");
    assert_eq!(rendered["encoding"]["x"]["type"], "nominal");
    assert_eq!(rendered["encoding"]["y"]["field"], "total_sales");
    assert_eq!(rendered["encoding"]["y"]["type"], "quantitative");
}

#[tokio::test]
async fn zero_row_result_is_success_without_chart() {
    let fx = fixture(vec![Ok(
        "SELECT category, total_sales FROM sales WHERE total_sales > 100000".to_string(),
    )]);

    let response = fx.orchestrator.process("huge sales only", false).await;

    assert!(response.success);
    assert_eq!(response.row_count, 0);
    assert!(response.data.is_empty());
    assert_eq!(response.columns, vec!["category", "total_sales"]);
    assert!(response.chart_spec.is_none());
    assert!(response.visualization_type.is_none());
}

#[tokio::test]
async fn execution_failure_reports_error_and_keeps_sql() {
    let fx = fixture(vec![Ok("SELECT * FROM nonexistent".to_string())]);

    let response = fx.orchestrator.process("query a missing table", false).await;

    assert!(!response.success);
    assert_eq!(response.sql.as_deref(), Some("SELECT * FROM nonexistent"));
    let error = response.error.unwrap();
    assert!(error.contains("nonexistent"), "error was: {}", error);
    assert!(response.data.is_empty());
    assert!(response.columns.is_empty());
    assert!(response.chart_spec.is_none());
}

#[tokio::test]
async fn translation_failure_short_circuits_pipeline() {
    let fx = fixture(vec![
        Err("question is ambiguous".to_string()),
        Ok("SELECT category FROM sales".to_string()),
    ]);

    let response = fx.orchestrator.process("something ambiguous", false).await;

    assert!(!response.success);
    assert!(response.sql.is_none());
    assert!(response.error.unwrap().contains("ambiguous"));
    assert_eq!(fx.generator.call_count(), 1);

    // The failed turn must not pollute history
    let response = fx.orchestrator.process("all categories", false).await;
    assert!(response.success);
    let contexts = fx.generator.recorded_contexts();
    assert!(!contexts[1].contains("something ambiguous"));
}

#[tokio::test]
async fn empty_question_fails_without_calling_the_model() {
    let fx = fixture(vec![Ok("SELECT 1".to_string())]);

    let response = fx.orchestrator.process("   ", false).await;

    assert!(!response.success);
    assert!(response.error.is_some());
    assert_eq!(fx.generator.call_count(), 0);
}

#[tokio::test]
async fn history_flows_into_prompt_and_reset_clears_it() {
    let fx = fixture(vec![
        Ok("SELECT category, total_sales FROM sales".to_string()),
        Ok("SELECT region, total_sales FROM sales".to_string()),
        Ok("SELECT category FROM sales".to_string()),
    ]);

    let first = fx
        .orchestrator
        .process("Show total sales by category", false)
        .await;
    assert!(first.success);

    // Follow-up sees the prior turn in its context
    let second = fx.orchestrator.process("now by region instead", false).await;
    assert!(second.success);
    let contexts = fx.generator.recorded_contexts();
    assert!(contexts[1].contains("Show total sales by category"));
    assert!(contexts[1].contains("SELECT category, total_sales FROM sales"));

    // Reset severs the link to turns before it
    let third = fx.orchestrator.process("and the categories?", true).await;
    assert!(third.success);
    let contexts = fx.generator.recorded_contexts();
    assert!(!contexts[2].contains("Show total sales by category"));
    assert!(!contexts[2].contains("now by region instead"));
    assert!(contexts[2].contains("(none)"));
}

#[tokio::test]
async fn mutating_sql_from_model_is_rejected_before_execution() {
    let fx = fixture(vec![
        Ok("DROP TABLE sales".to_string()),
        Ok("SELECT COUNT(*) AS n FROM sales".to_string()),
    ]);

    let response = fx.orchestrator.process("delete everything", false).await;
    assert!(!response.success);
    assert!(response.sql.is_none());

    // The table is still intact
    let response = fx.orchestrator.process("how many rows?", false).await;
    assert!(response.success);
    assert_eq!(response.row_count, 1);
    assert_eq!(response.data[0]["n"], serde_json::json!(3));
}

#[tokio::test]
async fn reset_conversation_clears_history_between_calls() {
    let fx = fixture(vec![
        Ok("SELECT category FROM sales".to_string()),
        Ok("SELECT region FROM sales".to_string()),
    ]);

    let first = fx.orchestrator.process("categories", false).await;
    assert!(first.success);

    fx.orchestrator.reset_conversation().await;

    let second = fx.orchestrator.process("regions", false).await;
    assert!(second.success);
    let contexts = fx.generator.recorded_contexts();
    assert!(contexts[1].contains("(none)"));
}

#[tokio::test]
async fn schema_snapshot_lists_tables() {
    let fx = fixture(vec![]);

    let schema = fx.orchestrator.schema().await.unwrap();
    assert_eq!(schema.tables.len(), 1);
    assert_eq!(schema.tables[0].name, "sales");
    let column_names: Vec<&str> = schema.tables[0]
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(
        column_names,
        vec!["category", "region", "total_sales", "sold_at"]
    );
}
