//! Deterministic word-level engine for pipeline tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use condense_common::{CondenseError, EngineOperation, GenerationParameters, Result};

use crate::engine::{GenerationEngine, TokenSequence};

const PAD: u32 = 0;
const EOS: u32 = 1;

/// One recorded `generate` invocation
#[derive(Debug, Clone)]
pub(crate) struct GenerateCall {
    /// Decoded engine input, instruction prefix included
    pub input: String,
    pub params: GenerationParameters,
    pub input_truncated: bool,
}

type Latency = Box<dyn Fn(&str) -> Duration + Send + Sync>;

/// Whitespace tokenizer whose "generation" echoes the leading input words
///
/// The instruction word is dropped from the echo, and output never exceeds
/// `max_length` tokens (start token and EOS included).
pub(crate) struct StubEngine {
    instruction: String,
    vocab: Mutex<Vec<String>>,
    calls: Mutex<Vec<GenerateCall>>,
    fail_on: Option<EngineOperation>,
    latency: Option<Latency>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            instruction: "summarize:".to_string(),
            vocab: Mutex::new(vec!["<pad>".to_string(), "</s>".to_string()]),
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            latency: None,
        }
    }

    pub fn failing(operation: EngineOperation) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::new()
        }
    }

    /// Delay each `generate` by a duration derived from its input text
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, operation: EngineOperation) -> Result<()> {
        if self.fail_on == Some(operation) {
            return Err(CondenseError::engine(
                operation,
                anyhow::anyhow!("stub {} failure", operation),
            ));
        }
        Ok(())
    }

    fn token_id(&self, word: &str) -> u32 {
        let mut vocab = self.vocab.lock().unwrap();
        match vocab.iter().position(|w| w == word) {
            Some(id) => id as u32,
            None => {
                vocab.push(word.to_string());
                (vocab.len() - 1) as u32
            }
        }
    }

    fn words(&self, ids: &[u32]) -> Vec<String> {
        let vocab = self.vocab.lock().unwrap();
        ids.iter()
            .filter(|&&id| id != PAD && id != EOS)
            .filter_map(|&id| vocab.get(id as usize).cloned())
            .collect()
    }
}

#[async_trait]
impl GenerationEngine for StubEngine {
    async fn encode(&self, text: &str, max_length: usize) -> Result<TokenSequence> {
        self.check(EngineOperation::Encode)?;

        let mut ids: Vec<u32> = text.split_whitespace().map(|w| self.token_id(w)).collect();
        let capacity = max_length.saturating_sub(1);
        let truncated = ids.len() > capacity;
        ids.truncate(capacity);
        ids.push(EOS);

        Ok(TokenSequence { ids, truncated })
    }

    async fn generate(
        &self,
        input: &TokenSequence,
        params: &GenerationParameters,
    ) -> Result<TokenSequence> {
        self.check(EngineOperation::Generate)?;

        let input_words = self.words(&input.ids);
        self.calls.lock().unwrap().push(GenerateCall {
            input: input_words.join(" "),
            params: params.clone(),
            input_truncated: input.truncated,
        });

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&input_words.join(" "))).await;
        }

        let budget = params.max_length.saturating_sub(2);
        let mut ids = vec![PAD];
        ids.extend(
            input_words
                .iter()
                .filter(|w| **w != self.instruction)
                .take(budget)
                .map(|w| self.token_id(w)),
        );
        ids.push(EOS);

        Ok(TokenSequence::new(ids))
    }

    async fn decode(&self, tokens: &TokenSequence) -> Result<String> {
        self.check(EngineOperation::Decode)?;
        Ok(self.words(&tokens.ids).join(" "))
    }

    fn name(&self) -> &str {
        "stub"
    }
}
