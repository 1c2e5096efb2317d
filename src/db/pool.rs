use crate::config::DatabaseConfig;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};

/// r2d2 connection manager for the embedded DuckDB store.
pub struct DuckdbConnectionManager {
    connection_string: String,
}

impl DuckdbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for DuckdbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.connection_string)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Builds the shared connection pool from configuration.
pub fn build_pool(config: &DatabaseConfig) -> Result<Pool<DuckdbConnectionManager>, r2d2::Error> {
    let manager = DuckdbConnectionManager::new(config.connection_string.clone());
    Pool::builder()
        .max_size(config.pool_size as u32)
        .build(manager)
}
