use crate::error::CondenseError;
use crate::logger::directive_filter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of paragraphs per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Default engine input capacity in tokens
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 1024;

/// Instruction prefix asking the model for a summary
pub const DEFAULT_INSTRUCTION_PREFIX: &str = "summarize: ";

/// Beam search generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Maximum sequence length (tokens, including the decoder start token)
    pub max_length: usize,

    /// Minimum sequence length before EOS is allowed
    pub min_length: usize,

    /// Exponent applied to sequence length when scoring finished beams
    pub length_penalty: f32,

    /// Beam width
    pub num_beams: usize,

    /// Stop as soon as `num_beams` hypotheses are finished
    pub early_stopping: bool,

    /// Block repeated n-grams of this size (0 disables)
    pub no_repeat_ngram_size: usize,
}

impl GenerationParameters {
    /// Stage-1 (per chunk) parameters
    pub fn chunk_stage() -> Self {
        Self {
            max_length: 75,
            min_length: 40,
            length_penalty: 2.0,
            num_beams: 4,
            early_stopping: true,
            no_repeat_ngram_size: 3,
        }
    }

    /// Stage-2 (combine) parameters
    pub fn final_stage() -> Self {
        Self {
            max_length: 100,
            min_length: 50,
            ..Self::chunk_stage()
        }
    }

    /// Validate parameter bounds
    pub fn validate(&self) -> Result<(), CondenseError> {
        if self.max_length == 0 {
            return Err(CondenseError::config("max_length must be positive"));
        }

        if self.min_length > self.max_length {
            return Err(CondenseError::config(format!(
                "min_length ({}) exceeds max_length ({})",
                self.min_length, self.max_length
            )));
        }

        if self.num_beams == 0 {
            return Err(CondenseError::config("num_beams must be positive"));
        }

        if !self.length_penalty.is_finite() {
            return Err(CondenseError::config("length_penalty must be finite"));
        }

        Ok(())
    }
}

/// Settings for the two-stage summarization pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Paragraphs per chunk
    pub chunk_size: usize,

    /// Engine input capacity; longer inputs are truncated
    pub max_input_length: usize,

    /// Instruction prepended to every reducer input
    pub instruction_prefix: String,

    /// Stage-1 reductions allowed in flight at once
    pub concurrency: usize,

    /// Stage-1 (per chunk) generation parameters
    pub chunk_generation: GenerationParameters,

    /// Stage-2 (combine) generation parameters
    pub final_generation: GenerationParameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            instruction_prefix: DEFAULT_INSTRUCTION_PREFIX.to_string(),
            concurrency: 1,
            chunk_generation: GenerationParameters::chunk_stage(),
            final_generation: GenerationParameters::final_stage(),
        }
    }
}

impl PipelineConfig {
    /// Validate pipeline settings
    pub fn validate(&self) -> Result<(), CondenseError> {
        if self.chunk_size == 0 {
            return Err(CondenseError::config("Chunk size must be positive"));
        }

        if self.max_input_length == 0 {
            return Err(CondenseError::config("Max input length must be positive"));
        }

        if self.concurrency == 0 {
            return Err(CondenseError::config("Concurrency must be positive"));
        }

        self.chunk_generation.validate()?;
        self.final_generation.validate()?;

        Ok(())
    }
}

/// Condense application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding config.json, tokenizer.json and model.safetensors
    pub model_dir: PathBuf,

    /// Summarization pipeline settings
    pub pipeline: PipelineConfig,

    /// Log level
    pub log_level: String,

    /// Optional log directory (console only when absent)
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models/t5-small"),
            pipeline: PipelineConfig::default(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, CondenseError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CondenseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let pipeline = &defaults.pipeline;
        let chunk = &pipeline.chunk_generation;
        let fin = &pipeline.final_generation;

        // Shared knobs apply to both stages
        let length_penalty = parse_var(&lookup, "LENGTH_PENALTY", chunk.length_penalty)?;
        let num_beams = parse_var(&lookup, "NUM_BEAMS", chunk.num_beams)?;
        let early_stopping = parse_var(&lookup, "EARLY_STOPPING", chunk.early_stopping)?;
        let no_repeat_ngram_size =
            parse_var(&lookup, "NO_REPEAT_NGRAM_SIZE", chunk.no_repeat_ngram_size)?;

        let pipeline = PipelineConfig {
            chunk_size: parse_var(&lookup, "CHUNK_SIZE", pipeline.chunk_size)?,
            max_input_length: parse_var(&lookup, "MAX_INPUT_LENGTH", pipeline.max_input_length)?,
            instruction_prefix: lookup("SUMMARY_PREFIX")
                .unwrap_or_else(|| pipeline.instruction_prefix.clone()),
            concurrency: parse_var(&lookup, "SUMMARY_CONCURRENCY", pipeline.concurrency)?,
            chunk_generation: GenerationParameters {
                max_length: parse_var(&lookup, "CHUNK_MAX_LENGTH", chunk.max_length)?,
                min_length: parse_var(&lookup, "CHUNK_MIN_LENGTH", chunk.min_length)?,
                length_penalty,
                num_beams,
                early_stopping,
                no_repeat_ngram_size,
            },
            final_generation: GenerationParameters {
                max_length: parse_var(&lookup, "FINAL_MAX_LENGTH", fin.max_length)?,
                min_length: parse_var(&lookup, "FINAL_MIN_LENGTH", fin.min_length)?,
                length_penalty,
                num_beams,
                early_stopping,
                no_repeat_ngram_size,
            },
        };

        let config = Self {
            model_dir: lookup("SUMMARY_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            pipeline,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: lookup("LOG_DIR").map(PathBuf::from),
        };

        Ok(config)
    }

    /// Ensure the log directory exists, create if not
    pub fn ensure_directories(&self) -> Result<(), CondenseError> {
        if let Some(dir) = &self.log_dir {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CondenseError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CondenseError> {
        if self.model_dir.as_os_str().is_empty() {
            return Err(CondenseError::config("Model directory cannot be empty"));
        }
        directive_filter(&self.log_level)?;

        self.pipeline.validate()
    }
}

/// Parse an optional variable, failing on malformed values
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, CondenseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            CondenseError::config(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
