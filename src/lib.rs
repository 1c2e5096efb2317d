pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod util;
pub mod viz;

pub use crate::config::AppConfig;
pub use crate::error::PipelineError;
pub use crate::orchestrator::{Orchestrator, Response};
