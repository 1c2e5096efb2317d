use std::collections::{BTreeMap, HashSet};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, SchemaRef, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::DateTime;
use duckdb::Connection;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::PipelineError;

/// Semantic column classification, derived from the materialized values
/// rather than the storage driver's native type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Datetime,
    #[serde(rename = "string")]
    Text,
}

/// Summary statistics over the non-null values of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Typed result of one SQL execution. `columns` is exactly the key set of
/// every row object, in result-set order; `summary_stats` keys are a subset
/// of the numeric-typed columns.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub column_types: BTreeMap<String, ColumnType>,
    pub summary_stats: BTreeMap<String, ColumnStats>,
}

/// One materialized cell. Numeric variants feed classification and summary
/// statistics; everything else round-trips to the response as-is.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Int(v) => Value::Number(Number::from(*v)),
            Cell::Float(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
            Cell::Bool(v) => Value::Bool(*v),
            Cell::Text(v) => Value::String(v.clone()),
        }
    }
}

/// Executes a fully formed SQL string and materializes the result set with
/// inferred column types and summary statistics. A query that runs but
/// returns zero rows is a success with empty type/stat mappings. Any engine
/// error is surfaced verbatim as `QueryExecutionFailed`.
pub fn execute(conn: &Connection, sql: &str) -> Result<ExecutionResult, PipelineError> {
    let failed = |e: duckdb::Error| PipelineError::QueryExecutionFailed(e.to_string());

    let mut stmt = conn.prepare(sql).map_err(failed)?;
    let arrow_result = stmt.query_arrow([]).map_err(failed)?;
    let schema = arrow_result.get_schema();
    let batches: Vec<RecordBatch> = arrow_result.collect();

    build_result(schema, &batches)
}

fn build_result(
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<ExecutionResult, PipelineError> {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();

    let mut seen = HashSet::new();
    for name in &columns {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::QueryExecutionFailed(format!(
                "duplicate column name in result set: {}",
                name
            )));
        }
    }

    // Materialize column-major for classification and statistics
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); columns.len()];
    for batch in batches {
        for (idx, column) in grid.iter_mut().enumerate() {
            let array = batch.column(idx);
            for row in 0..batch.num_rows() {
                column.push(cell_value(array, row)?);
            }
        }
    }

    let row_count = grid.first().map(|c| c.len()).unwrap_or(0);
    debug!("Materialized {} rows across {} columns", row_count, columns.len());

    let mut column_types = BTreeMap::new();
    let mut summary_stats = BTreeMap::new();

    // Zero rows is a success with empty mappings, columns still populated
    if row_count > 0 {
        for (idx, name) in columns.iter().enumerate() {
            let column_type = classify_column(schema.field(idx).data_type(), &grid[idx]);
            if matches!(column_type, ColumnType::Integer | ColumnType::Float) {
                if let Some(stats) = summarize(&grid[idx]) {
                    summary_stats.insert(name.clone(), stats);
                }
            }
            column_types.insert(name.clone(), column_type);
        }
    }

    let mut rows = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let mut object = Map::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            object.insert(name.clone(), grid[idx][row].to_json());
        }
        rows.push(object);
    }

    Ok(ExecutionResult {
        rows,
        columns,
        row_count,
        column_types,
        summary_stats,
    })
}

fn cell_value(array: &ArrayRef, row: usize) -> Result<Cell, PipelineError> {
    if array.is_null(row) {
        return Ok(Cell::Null);
    }

    let cell = match array.data_type() {
        DataType::Int8 => Cell::Int(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => Cell::Int(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => Cell::Int(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Cell::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => Cell::Int(array.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => Cell::Int(array.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => Cell::Int(array.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let value = array.as_primitive::<UInt64Type>().value(row);
            match i64::try_from(value) {
                Ok(v) => Cell::Int(v),
                Err(_) => Cell::Float(value as f64),
            }
        }
        DataType::Float32 => Cell::Float(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Cell::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, scale) => {
            let raw = array.as_primitive::<Decimal128Type>().value(row);
            Cell::Float(raw as f64 / 10f64.powi(*scale as i32))
        }
        DataType::Boolean => Cell::Bool(array.as_boolean().value(row)),
        DataType::Utf8 => Cell::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Cell::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Timestamp(unit, _) => {
            let raw = match unit {
                TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value(row),
                TimeUnit::Millisecond => {
                    array.as_primitive::<TimestampMillisecondType>().value(row)
                }
                TimeUnit::Microsecond => {
                    array.as_primitive::<TimestampMicrosecondType>().value(row)
                }
                TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().value(row),
            };
            let micros = match unit {
                TimeUnit::Second => raw.checked_mul(1_000_000),
                TimeUnit::Millisecond => raw.checked_mul(1_000),
                TimeUnit::Microsecond => Some(raw),
                TimeUnit::Nanosecond => Some(raw / 1_000),
            };
            match micros.and_then(DateTime::from_timestamp_micros) {
                Some(datetime) => Cell::Text(datetime.naive_utc().to_string()),
                None => fallback_text(array, row)?,
            }
        }
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row) as i64;
            match DateTime::from_timestamp(days * 86_400, 0) {
                Some(datetime) => Cell::Text(datetime.date_naive().to_string()),
                None => fallback_text(array, row)?,
            }
        }
        DataType::Date64 => {
            let millis = array.as_primitive::<Date64Type>().value(row);
            match DateTime::from_timestamp_millis(millis) {
                Some(datetime) => Cell::Text(datetime.naive_utc().to_string()),
                None => fallback_text(array, row)?,
            }
        }
        _ => fallback_text(array, row)?,
    };

    Ok(cell)
}

fn fallback_text(array: &ArrayRef, row: usize) -> Result<Cell, PipelineError> {
    array_value_to_string(array, row)
        .map(Cell::Text)
        .map_err(|e| PipelineError::QueryExecutionFailed(e.to_string()))
}

/// Classifies a column from its materialized values: integer when every
/// non-null value is a whole number, float when any value carries a
/// fractional part, datetime for timestamp/date-typed columns, string
/// otherwise. An all-null numeric column falls back to the declared type.
fn classify_column(declared: &DataType, cells: &[Cell]) -> ColumnType {
    if matches!(
        declared,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    ) {
        return ColumnType::Datetime;
    }

    let mut saw_value = false;
    let mut whole = true;

    for cell in cells {
        match cell {
            Cell::Null => {}
            Cell::Int(_) => saw_value = true,
            Cell::Float(v) => {
                saw_value = true;
                if v.fract() != 0.0 || !v.is_finite() {
                    whole = false;
                }
            }
            Cell::Bool(_) | Cell::Text(_) => return ColumnType::Text,
        }
    }

    if saw_value {
        if whole {
            ColumnType::Integer
        } else {
            ColumnType::Float
        }
    } else {
        // All nulls: the values carry no signal, use the declared type
        match declared {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => ColumnType::Float,
            _ => ColumnType::Text,
        }
    }
}

/// Computes min/max/mean/median over the non-null values of a column.
/// Returns `None` when every value is null, so a statistic is never
/// reported as zero for a column that carried no data.
fn summarize(cells: &[Cell]) -> Option<ColumnStats> {
    let mut values: Vec<f64> = cells
        .iter()
        .filter_map(|cell| match cell {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let min = values[0];
    let max = values[values.len() - 1];
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };

    Some(ColumnStats {
        min,
        max,
        mean,
        median,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn stats_skip_nulls() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE t (v INTEGER);
             INSERT INTO t VALUES (10), (20), (NULL), (30);",
        )
        .unwrap();

        let result = execute(&conn, "SELECT v FROM t").unwrap();
        assert_eq!(result.row_count, 4);
        assert_eq!(result.column_types["v"], ColumnType::Integer);

        let stats = &result.summary_stats["v"];
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.mean, 20.0);
        assert_eq!(stats.median, 20.0);
    }

    #[test]
    fn all_null_numeric_column_has_no_stats() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE t (v INTEGER);
             INSERT INTO t VALUES (NULL), (NULL);",
        )
        .unwrap();

        let result = execute(&conn, "SELECT v FROM t").unwrap();
        assert_eq!(result.column_types["v"], ColumnType::Integer);
        assert!(result.summary_stats.get("v").is_none());
    }

    #[test]
    fn empty_result_is_success_with_columns() {
        let conn = test_conn();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b VARCHAR);")
            .unwrap();

        let result = execute(&conn, "SELECT a, b FROM t").unwrap();
        assert_eq!(result.row_count, 0);
        assert!(result.rows.is_empty());
        assert_eq!(result.columns, vec!["a", "b"]);
        assert!(result.column_types.is_empty());
        assert!(result.summary_stats.is_empty());
    }

    #[test]
    fn fractional_values_classify_as_float() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE t (price DOUBLE, qty DOUBLE);
             INSERT INTO t VALUES (1.5, 2.0), (2.25, 4.0);",
        )
        .unwrap();

        let result = execute(&conn, "SELECT price, qty FROM t").unwrap();
        assert_eq!(result.column_types["price"], ColumnType::Float);
        // Whole-valued doubles classify as integer
        assert_eq!(result.column_types["qty"], ColumnType::Integer);
    }

    #[test]
    fn timestamps_classify_as_datetime() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE t (\"at\" TIMESTAMP, label VARCHAR);
             INSERT INTO t VALUES ('2024-03-01 12:00:00', 'a'), ('2024-03-02 12:00:00', 'b');",
        )
        .unwrap();

        let result = execute(&conn, "SELECT \"at\", label FROM t").unwrap();
        assert_eq!(result.column_types["at"], ColumnType::Datetime);
        assert_eq!(result.column_types["label"], ColumnType::Text);
        assert!(result.summary_stats.is_empty());

        let rendered = result.rows[0]["at"].as_str().unwrap();
        assert!(rendered.starts_with("2024-03-01"));
    }

    #[test]
    fn row_objects_mirror_column_order() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE t (z INTEGER, a VARCHAR);
             INSERT INTO t VALUES (1, 'x');",
        )
        .unwrap();

        let result = execute(&conn, "SELECT z, a FROM t").unwrap();
        let keys: Vec<&String> = result.rows[0].keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn engine_errors_surface_verbatim() {
        let conn = test_conn();
        let err = execute(&conn, "SELECT * FROM nonexistent").unwrap_err();
        match err {
            PipelineError::QueryExecutionFailed(msg) => {
                assert!(msg.contains("nonexistent"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        use arrow::array::Int64Array;
        use arrow::datatypes::{Field, Schema};
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![
            Field::new("v", DataType::Int64, true),
            Field::new("v", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Int64Array::from(vec![2])),
            ],
        )
        .unwrap();

        let err = build_result(schema, &[batch]).unwrap_err();
        assert!(matches!(err, PipelineError::QueryExecutionFailed(_)));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let cells = vec![
            Cell::Int(1),
            Cell::Int(2),
            Cell::Int(3),
            Cell::Int(10),
        ];
        let stats = summarize(&cells).unwrap();
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.mean, 4.0);
    }
}
