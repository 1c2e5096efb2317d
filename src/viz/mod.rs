pub mod encoder;

pub use encoder::{ChartSpec, FieldEncoding, FieldType, MarkType};
