//! Condense summarization pipeline
//!
//! Chunking, two-stage reduction and the generation engines behind it

mod beam;
mod chunking;
mod engine;
mod prompts;
mod summarize;
#[cfg(feature = "candle")]
mod t5;
#[cfg(test)]
mod testing;
mod types;

pub use beam::beam_search;
pub use chunking::{chunk_paragraphs, split_paragraphs, TextBlock, PARAGRAPH_SEPARATOR};
pub use condense_common::{GenerationParameters, PipelineConfig};
pub use engine::{GenerationEngine, TokenSequence};
pub use prompts::{instruction_prompt, DEFAULT_INSTRUCTION_PREFIX};
pub use summarize::{Summarizer, SUMMARY_SEPARATOR};
#[cfg(feature = "candle")]
pub use t5::{ComputeBackend, T5Engine, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
pub use types::SummaryReport;
