use std::fmt;

/// Generation engine operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOperation {
    /// Loading model weights, config or tokenizer
    Load,
    /// Tokenizing input text
    Encode,
    /// Running generation
    Generate,
    /// Detokenizing generated tokens
    Decode,
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Encode => "encode",
            Self::Generate => "generate",
            Self::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Condense error types
#[derive(Debug, thiserror::Error)]
pub enum CondenseError {
    /// Malformed or absent input payload
    #[error("Input decoding error: {0}")]
    InputDecoding(String),

    /// Invalid configuration (chunk size, generation parameters, env values)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generation engine failure
    #[error("Engine {operation} failed: {source}")]
    Engine {
        operation: EngineOperation,
        #[source]
        source: anyhow::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CondenseError {
    /// Create input decoding error
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Self::InputDecoding(msg.into())
    }

    /// Create configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create engine error carrying the underlying cause
    pub fn engine<E: Into<anyhow::Error>>(operation: EngineOperation, source: E) -> Self {
        Self::Engine {
            operation,
            source: source.into(),
        }
    }

    /// Get process exit code
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InputDecoding(_) => 2,
            Self::InvalidConfiguration(_) => 3,
            Self::Engine { .. } => 1,
            Self::Io(_) => 1,
            Self::Json(_) => 1,
            Self::Other(_) => 1,
        }
    }
}
