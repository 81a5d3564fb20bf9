use std::sync::Arc;

use condense_common::{CondenseError, GenerationParameters, PipelineConfig, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::chunking::{chunk_paragraphs, TextBlock};
use crate::engine::GenerationEngine;
use crate::prompts::instruction_prompt;
use crate::types::SummaryReport;

/// Separator placed between stage-1 summaries before stage 2
pub const SUMMARY_SEPARATOR: &str = " ";

/// Two-stage summarizer: per-chunk reduction, then one combining reduction
pub struct Summarizer {
    engine: Arc<dyn GenerationEngine>,
    config: PipelineConfig,
}

impl Summarizer {
    /// Create new summarizer
    pub fn new(engine: Arc<dyn GenerationEngine>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        info!(
            "Summarizer ready - Engine: {}, Chunk size: {}, Max input: {} tokens",
            engine.name(),
            config.chunk_size,
            config.max_input_length
        );

        Ok(Self { engine, config })
    }

    /// Pipeline settings
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Summarize paragraphs into one final summary
    pub async fn summarize<S: AsRef<str>>(&self, paragraphs: &[S]) -> Result<String> {
        Ok(self.summarize_report(paragraphs).await?.summary)
    }

    /// Summarize paragraphs, keeping the stage-1 summaries
    ///
    /// Empty input is not short-circuited: the combining reduction still runs
    /// on the empty string and its output is returned.
    pub async fn summarize_report<S: AsRef<str>>(&self, paragraphs: &[S]) -> Result<SummaryReport> {
        info!("Starting summarization - {} paragraphs", paragraphs.len());

        // Stage 1: reduce each chunk
        let blocks = chunk_paragraphs(paragraphs, self.config.chunk_size)?;
        info!("Split paragraphs into {} chunks", blocks.len());

        let chunk_summaries = self.summarize_chunks(&blocks).await?;

        // Stage 2: reduce the combined summaries; never re-chunked
        let mut report = SummaryReport::new(String::new(), chunk_summaries);
        let combined = report.combined_text();
        info!("Combined chunk summaries - Length: {} chars", combined.len());

        report.summary = self.reduce(&combined, &self.config.final_generation).await?;
        info!("Final summary - Length: {} chars", report.summary.len());

        Ok(report)
    }

    /// Reduce every block with stage-1 parameters, preserving block order
    async fn summarize_chunks(&self, blocks: &[TextBlock]) -> Result<Vec<String>> {
        let total = blocks.len();
        let params = &self.config.chunk_generation;

        stream::iter(blocks.iter().enumerate())
            .map(|(i, block)| async move {
                debug!(
                    "Summarizing chunk {}/{} (paragraphs {}..{})",
                    i + 1,
                    total,
                    block.start,
                    block.end
                );
                let summary = self.reduce(&block.text, params).await?;
                debug!("Chunk {}/{} summary: {}", i + 1, total, summary);
                Ok::<_, CondenseError>(summary)
            })
            .buffered(self.config.concurrency)
            .try_collect()
            .await
    }

    /// Reduce one text block to a bounded-length summary
    ///
    /// Input beyond `max_input_length` tokens is truncated, never rejected.
    pub async fn reduce(&self, text: &str, params: &GenerationParameters) -> Result<String> {
        params.validate()?;

        let prompt = instruction_prompt(&self.config.instruction_prefix, text);
        let input = self.engine.encode(&prompt, self.config.max_input_length).await?;
        if input.truncated {
            warn!(
                "Input truncated to {} tokens ({} chars of text); trailing content is dropped",
                input.len(),
                text.len()
            );
        }

        let output = self.engine.generate(&input, params).await?;
        let summary = self.engine.decode(&output).await?;

        Ok(summary.trim().to_string())
    }
}
