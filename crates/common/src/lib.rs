pub mod config;
pub mod error;
pub mod logger;

// Re-export commonly used types
pub use config::{AppConfig, GenerationParameters, PipelineConfig};
pub use error::{CondenseError, EngineOperation};
pub type Result<T> = std::result::Result<T, CondenseError>;
