use regex::Regex;
use tracing::{debug, info};

use crate::conversation::ConversationState;
use crate::db::schema::SchemaDescriptor;
use crate::error::PipelineError;
use crate::llm::LlmManager;

/// Chart categories a hint can suggest. Anything the encoder does not
/// recognize falls back to a bar mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Heatmap,
}

/// Optional chart-shape suggestion produced alongside the generated SQL.
/// Explicit named fields rather than a key-bag, so the encoder can match
/// exhaustively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualizationHint {
    pub chart_type: Option<ChartKind>,
    pub x_field: Option<String>,
    pub y_fields: Vec<String>,
    pub color_field: Option<String>,
}

/// Output of one translation: the SQL to execute plus an optional hint for
/// the visualization encoder. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub sql: String,
    pub hint: Option<VisualizationHint>,
}

/// Maps a natural-language question plus conversation history and schema
/// into SQL. Never executes SQL and never touches the database beyond the
/// schema snapshot it is handed.
pub struct Translator {
    llm: LlmManager,
}

impl Translator {
    pub fn new(llm: LlmManager) -> Self {
        Self { llm }
    }

    pub async fn translate(
        &self,
        question: &str,
        history: &ConversationState,
        schema: &SchemaDescriptor,
    ) -> Result<TranslationResult, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::TranslationFailed(
                "question is empty".to_string(),
            ));
        }

        let context = build_context(schema, history);
        debug!("Translation context:\n{}", context);

        let raw = self
            .llm
            .generate_sql(question, &context)
            .await
            .map_err(|e| PipelineError::TranslationFailed(e.to_string()))?;

        let sql = clean_sql(&raw);
        if sql.is_empty() {
            return Err(PipelineError::TranslationFailed(
                "model produced no SQL".to_string(),
            ));
        }

        // Injection safety lives here: the executor runs whatever it is
        // given, so only read-only statements may leave this stage.
        if !is_read_only(&sql) {
            return Err(PipelineError::TranslationFailed(format!(
                "generated statement is not a read-only query: {}",
                sql
            )));
        }

        info!("Translated question into SQL: {}", sql);

        Ok(TranslationResult {
            sql,
            hint: hint_from_question(question),
        })
    }
}

fn build_context(schema: &SchemaDescriptor, history: &ConversationState) -> String {
    let history_block = if history.is_empty() {
        "(none)".to_string()
    } else {
        history.to_prompt()
    };

    format!(
        "This query will run on a DuckDB database with the following tables and columns:\n\n\
         {}\n\n\
         ### Conversation history:\n{}",
        schema.to_prompt(),
        history_block
    )
}

/// Strips leftover markdown artifacts from an extracted completion.
fn clean_sql(raw: &str) -> String {
    raw.replace('`', "").trim().to_string()
}

fn is_read_only(sql: &str) -> bool {
    let re = Regex::new(r"(?i)^\s*(select|with)\b").unwrap();
    if !re.is_match(sql) {
        return false;
    }

    // One statement only: a semicolon may appear solely at the tail
    !sql.trim_end().trim_end_matches(';').contains(';')
}

/// Derives a chart-category hint from question keywords. Field roles are
/// left unset; the encoder fills them from the result shape.
pub fn hint_from_question(question: &str) -> Option<VisualizationHint> {
    let q = question.to_lowercase();

    let chart_type = if q.contains("scatter") || q.contains("correlation") || q.contains("relationship") {
        ChartKind::Scatter
    } else if q.contains("line") || q.contains("trend") || q.contains("over time") {
        ChartKind::Line
    } else if q.contains("pie") || q.contains("proportion") || q.contains("percentage") {
        ChartKind::Pie
    } else if q.contains("heatmap") || q.contains("matrix") {
        ChartKind::Heatmap
    } else if q.contains("bar") || q.contains("distribution") || q.contains("histogram") {
        ChartKind::Bar
    } else {
        return None;
    };

    Some(VisualizationHint {
        chart_type: Some(chart_type),
        ..VisualizationHint::default()
    })
}
