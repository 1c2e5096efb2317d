use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::executor::{ColumnType, ExecutionResult};
use crate::llm::translator::{ChartKind, VisualizationHint};

/// Visual primitive a chart spec selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkType {
    Bar,
    Line,
    Point,
    Arc,
    Rect,
}

impl MarkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkType::Bar => "bar",
            MarkType::Line => "line",
            MarkType::Point => "point",
            MarkType::Arc => "arc",
            MarkType::Rect => "rect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Nominal,
    Quantitative,
    Temporal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldEncoding {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Declarative chart encoding, independent of any rendering technology.
/// Every field referenced in `encoding` exists in the result's columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub mark: MarkType,
    pub encoding: BTreeMap<String, FieldEncoding>,
}

/// Deterministically derives a chart spec from an executed result and the
/// translation hint. Returns `None` when there is nothing to encode.
pub fn encode(result: &ExecutionResult, hint: Option<&VisualizationHint>) -> Option<ChartSpec> {
    if result.rows.is_empty() || result.columns.is_empty() {
        return None;
    }

    let exists = |name: &str| result.columns.iter().any(|c| c == name);
    let column_type = |name: &str| {
        result
            .column_types
            .get(name)
            .copied()
            .unwrap_or(ColumnType::Text)
    };

    // x: hinted field if it exists, else the first string/datetime column,
    // else the first column overall
    let x_field = hint
        .and_then(|h| h.x_field.as_deref())
        .filter(|f| exists(f))
        .map(str::to_string)
        .or_else(|| {
            result
                .columns
                .iter()
                .find(|c| matches!(column_type(c), ColumnType::Text | ColumnType::Datetime))
                .cloned()
        })
        .or_else(|| result.columns.first().cloned())?;

    // y: hinted fields, else the first remaining numeric column
    let hinted_y: Vec<String> = hint
        .map(|h| {
            h.y_fields
                .iter()
                .filter(|f| exists(f))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let y_fields: Vec<String> = if hinted_y.is_empty() {
        result
            .columns
            .iter()
            .filter(|c| {
                **c != x_field
                    && matches!(column_type(c), ColumnType::Integer | ColumnType::Float)
            })
            .take(1)
            .cloned()
            .collect()
    } else {
        hinted_y
    };

    let mut encoding = BTreeMap::new();
    encoding.insert(
        "x".to_string(),
        FieldEncoding {
            field_type: field_type_of(column_type(&x_field)),
            field: x_field,
        },
    );

    for (i, field) in y_fields.into_iter().enumerate() {
        let channel = if i == 0 {
            "y".to_string()
        } else {
            format!("y{}", i)
        };
        encoding.insert(
            channel,
            FieldEncoding {
                field_type: field_type_of(column_type(&field)),
                field,
            },
        );
    }

    if let Some(color) = hint.and_then(|h| h.color_field.as_deref()) {
        if exists(color) {
            encoding.insert(
                "color".to_string(),
                FieldEncoding {
                    field: color.to_string(),
                    field_type: FieldType::Nominal,
                },
            );
        }
    }

    let mark = match hint.and_then(|h| h.chart_type) {
        Some(ChartKind::Line) => MarkType::Line,
        Some(ChartKind::Scatter) => MarkType::Point,
        Some(ChartKind::Pie) => MarkType::Arc,
        Some(ChartKind::Heatmap) => MarkType::Rect,
        Some(ChartKind::Bar) | None => MarkType::Bar,
    };

    Some(ChartSpec { mark, encoding })
}

fn field_type_of(column_type: ColumnType) -> FieldType {
    match column_type {
        ColumnType::Integer | ColumnType::Float => FieldType::Quantitative,
        ColumnType::Datetime => FieldType::Temporal,
        ColumnType::Text => FieldType::Nominal,
    }
}
