use serde::{Deserialize, Serialize};

use crate::summarize::SUMMARY_SEPARATOR;

/// Summarization result with stage-1 detail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Final summary text
    pub summary: String,

    /// Stage-1 summaries, in chunk order
    pub chunk_summaries: Vec<String>,
}

impl SummaryReport {
    /// Create new report
    pub fn new(summary: String, chunk_summaries: Vec<String>) -> Self {
        Self {
            summary,
            chunk_summaries,
        }
    }

    /// Number of chunks summarized in stage 1
    pub fn chunk_count(&self) -> usize {
        self.chunk_summaries.len()
    }

    /// Text fed into stage 2
    pub fn combined_text(&self) -> String {
        self.chunk_summaries.join(SUMMARY_SEPARATOR)
    }
}
