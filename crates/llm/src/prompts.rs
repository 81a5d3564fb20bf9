//! Instruction prompts for the reducer

pub use condense_common::config::DEFAULT_INSTRUCTION_PREFIX;

/// Prepend the instruction prefix to a text block
pub fn instruction_prompt(prefix: &str, text: &str) -> String {
    format!("{}{}", prefix, text)
}
