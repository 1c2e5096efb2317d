pub mod executor;
pub mod pool;
pub mod schema;

pub use executor::{ColumnType, ExecutionResult};
pub use schema::SchemaDescriptor;
