use crate::error::PipelineError;
use duckdb::Connection;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub declared_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Immutable snapshot of the database's table/column metadata, fetched at
/// request time. Read-only to the translation layer.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Renders the schema block fed to the LLM prompt.
    pub fn to_prompt(&self) -> String {
        let mut sections = Vec::with_capacity(self.tables.len());

        for table in &self.tables {
            let mut section = format!("Table: {}\nColumns:", table.name);
            for column in &table.columns {
                section.push_str(&format!("\n  - {} ({})", column.name, column.declared_type));
            }
            sections.push(section);
        }

        sections.join("\n\n")
    }
}

/// Reads table and column metadata for the main schema. Fails with
/// `SchemaUnavailable` when the store cannot be reached; never retried here.
pub fn describe_schema(conn: &Connection) -> Result<SchemaDescriptor, PipelineError> {
    let unavailable = |e: duckdb::Error| PipelineError::SchemaUnavailable(e.to_string());

    let mut tables_stmt = conn
        .prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )
        .map_err(unavailable)?;
    let table_names: Vec<String> = tables_stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(unavailable)?
        .filter_map(Result::ok)
        .collect();

    let mut tables = Vec::with_capacity(table_names.len());

    for table_name in &table_names {
        let mut columns_stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
            )
            .map_err(unavailable)?;
        let columns: Vec<ColumnSchema> = columns_stmt
            .query_map([table_name], |row| {
                Ok(ColumnSchema {
                    name: row.get::<_, String>(0)?,
                    declared_type: row.get::<_, String>(1)?,
                })
            })
            .map_err(unavailable)?
            .filter_map(Result::ok)
            .collect();

        debug!("Introspected table {} with {} columns", table_name, columns.len());
        tables.push(TableSchema {
            name: table_name.clone(),
            columns,
        });
    }

    Ok(SchemaDescriptor { tables })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE products (id INTEGER, name VARCHAR, price DOUBLE);
             CREATE TABLE sales (product_id INTEGER, sold_at TIMESTAMP, amount DOUBLE);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn describes_tables_and_ordered_columns() {
        let conn = test_conn();
        let schema = describe_schema(&conn).unwrap();

        assert_eq!(schema.tables.len(), 2);
        let products = schema
            .tables
            .iter()
            .find(|t| t.name == "products")
            .unwrap();
        let names: Vec<&str> = products.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "price"]);
    }

    #[test]
    fn prompt_lists_columns_with_types() {
        let conn = test_conn();
        let schema = describe_schema(&conn).unwrap();
        let prompt = schema.to_prompt();

        assert!(prompt.contains("Table: products"));
        assert!(prompt.contains("- price (DOUBLE)"));
        assert!(prompt.contains("Table: sales"));
    }

    #[test]
    fn empty_database_yields_empty_descriptor() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = describe_schema(&conn).unwrap();

        assert!(schema.is_empty());
        assert_eq!(schema.to_prompt(), "");
    }
}
