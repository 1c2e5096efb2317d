use chrono::Utc;
use r2d2::Pool;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::conversation::{ConversationState, Turn};
use crate::db::executor::{self, ExecutionResult};
use crate::db::pool::{self, DuckdbConnectionManager};
use crate::db::schema::{self, SchemaDescriptor};
use crate::error::PipelineError;
use crate::llm::translator::Translator;
use crate::llm::LlmManager;
use crate::viz::encoder::{self, ChartSpec};

/// Terminal value returned to the transport layer. Exactly one of the two
/// branches is populated: data/columns/chart on success, `error` on failure.
#[derive(Debug, Serialize)]
pub struct Response {
    pub query: String,
    pub sql: Option<String>,
    pub success: bool,
    pub data: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub visualization_type: Option<String>,
    pub visualization_spec: Option<Value>,
    pub chart_spec: Option<ChartSpec>,
    pub error: Option<String>,
}

/// Flat parameter summary of a chart spec, kept alongside the full encoding
/// for transports that only need the chosen columns.
fn visualization_summary(spec: &ChartSpec) -> Value {
    let y_columns: Vec<&str> = spec
        .encoding
        .iter()
        .filter(|(channel, _)| channel.starts_with('y'))
        .map(|(_, encoding)| encoding.field.as_str())
        .collect();

    serde_json::json!({
        "visualization_type": spec.mark.as_str(),
        "x_column": spec.encoding.get("x").map(|e| e.field.as_str()),
        "y_columns": y_columns,
        "color_column": spec.encoding.get("color").map(|e| e.field.as_str()),
    })
}

impl Response {
    fn success(
        query: &str,
        sql: String,
        result: ExecutionResult,
        chart_spec: Option<ChartSpec>,
    ) -> Self {
        Self {
            query: query.to_string(),
            sql: Some(sql),
            success: true,
            data: result.rows,
            columns: result.columns,
            row_count: result.row_count,
            visualization_type: chart_spec.as_ref().map(|spec| spec.mark.as_str().to_string()),
            visualization_spec: chart_spec.as_ref().map(visualization_summary),
            chart_spec,
            error: None,
        }
    }

    fn failure(query: &str, sql: Option<String>, error: &PipelineError) -> Self {
        Self {
            query: query.to_string(),
            sql,
            success: false,
            data: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            visualization_type: None,
            visualization_spec: None,
            chart_spec: None,
            error: Some(error.to_string()),
        }
    }
}

/// Sequences translator, executor and encoder for each request and owns the
/// single conversation. All turns run under one lock spanning history read,
/// translation, execution, encoding and history append, so concurrent
/// requests cannot interleave and corrupt context.
pub struct Orchestrator {
    db_pool: Pool<DuckdbConnectionManager>,
    translator: Translator,
    conversation: Mutex<ConversationState>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let db_pool = pool::build_pool(&config.database)?;
        let llm_manager = LlmManager::new(&config.llm)?;

        Ok(Self::with_components(db_pool, Translator::new(llm_manager)))
    }

    /// Assembles an orchestrator from pre-built components. Used by
    /// embedders and tests that supply their own generator or pool.
    pub fn with_components(db_pool: Pool<DuckdbConnectionManager>, translator: Translator) -> Self {
        Self {
            db_pool,
            translator,
            conversation: Mutex::new(ConversationState::default()),
        }
    }

    /// Processes one natural-language query through the full pipeline.
    /// Failures at any stage become a failure `Response`; no error value
    /// crosses this boundary unconverted.
    pub async fn process(&self, query: &str, reset_context: bool) -> Response {
        let mut conversation = self.conversation.lock().await;

        if reset_context {
            info!("Resetting conversation context before translation");
            conversation.clear();
        }

        if query.trim().is_empty() {
            let err = PipelineError::TranslationFailed("query is empty".to_string());
            return Response::failure(query, None, &err);
        }

        let schema = match self.describe_schema().await {
            Ok(schema) => schema,
            Err(e) => {
                error!("Schema introspection failed: {}", e);
                return Response::failure(query, None, &e);
            }
        };

        let translation = match self
            .translator
            .translate(query, &conversation, &schema)
            .await
        {
            Ok(translation) => translation,
            Err(e) => {
                error!("Translation failed: {}", e);
                return Response::failure(query, None, &e);
            }
        };

        let result = match self.execute(translation.sql.clone()).await {
            Ok(result) => result,
            Err(e) => {
                error!("Execution failed for '{}': {}", translation.sql, e);
                // The attempted SQL stays in the payload for diagnostics
                return Response::failure(query, Some(translation.sql), &e);
            }
        };

        // Absence of a chart spec is not a failure; unsuitable data simply
        // goes unvisualized.
        let chart_spec = encoder::encode(&result, translation.hint.as_ref());

        info!(
            "Query succeeded: {} rows, chart: {}",
            result.row_count,
            chart_spec
                .as_ref()
                .map(|spec| spec.mark.as_str())
                .unwrap_or("none")
        );

        conversation.push(Turn {
            question: query.trim().to_string(),
            sql: translation.sql.clone(),
            row_count: result.row_count,
            visualization_type: chart_spec.as_ref().map(|spec| spec.mark.as_str().to_string()),
            asked_at: Utc::now(),
        });

        Response::success(query, translation.sql, result, chart_spec)
    }

    /// Clears the conversation history unconditionally.
    pub async fn reset_conversation(&self) {
        self.conversation.lock().await.clear();
    }

    /// Read-only schema snapshot for embedding transports.
    pub async fn schema(&self) -> Result<SchemaDescriptor, PipelineError> {
        self.describe_schema().await
    }

    async fn describe_schema(&self) -> Result<SchemaDescriptor, PipelineError> {
        let db_pool = self.db_pool.clone();

        tokio::task::spawn_blocking(move || {
            let conn = db_pool
                .get()
                .map_err(|e| PipelineError::SchemaUnavailable(e.to_string()))?;
            schema::describe_schema(&conn)
        })
        .await
        .map_err(|e| PipelineError::SchemaUnavailable(e.to_string()))?
    }

    async fn execute(&self, sql: String) -> Result<ExecutionResult, PipelineError> {
        let db_pool = self.db_pool.clone();

        tokio::task::spawn_blocking(move || {
            let conn = db_pool
                .get()
                .map_err(|e| PipelineError::QueryExecutionFailed(e.to_string()))?;
            executor::execute(&conn, &sql)
        })
        .await
        .map_err(|e| PipelineError::QueryExecutionFailed(e.to_string()))?
    }
}
