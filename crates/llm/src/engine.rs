use async_trait::async_trait;
use condense_common::{GenerationParameters, Result};

/// Token ids produced by an engine's tokenizer or generator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    /// Token ids
    pub ids: Vec<u32>,

    /// Whether input was dropped to fit the requested length
    pub truncated: bool,
}

impl TokenSequence {
    /// Create a sequence that lost nothing on the way in
    pub fn new(ids: Vec<u32>) -> Self {
        Self {
            ids,
            truncated: false,
        }
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the sequence has no tokens
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sequence-to-sequence text generation capability
///
/// Implementations must use beam search (no sampling) so that identical
/// inputs and parameters yield identical outputs.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Tokenize text, truncating silently to `max_length` tokens
    async fn encode(&self, text: &str, max_length: usize) -> Result<TokenSequence>;

    /// Generate an output sequence for the encoded input
    async fn generate(
        &self,
        input: &TokenSequence,
        params: &GenerationParameters,
    ) -> Result<TokenSequence>;

    /// Detokenize, stripping special tokens
    async fn decode(&self, tokens: &TokenSequence) -> Result<String>;

    /// Engine name for logging
    fn name(&self) -> &str;
}
