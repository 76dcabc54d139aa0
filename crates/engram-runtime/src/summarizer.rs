use crate::{Error, Result};

/// Target shape for a summarization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Summary,
    QuickRef,
    Integrated,
    Identity,
}

/// Abstract summarization capability.
///
/// Called only by the consolidation engine, never on the ACB or wake-up
/// read paths. Output length must land within ±20% of `target_tokens`
/// (shorter inputs may simply pass through).
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, target_tokens: u32, mode: SummaryMode) -> Result<String>;
}

/// Deterministic, LLM-free summarizer: keeps whole sentences from the front
/// until the target is reached. The default capability for tests and for
/// deployments that have not wired a model.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, text: &str, target_tokens: u32, _mode: SummaryMode) -> Result<String> {
        if target_tokens == 0 {
            return Err(Error::Invalid("target_tokens must be positive".to_string()));
        }

        if engram_types::estimate_tokens(text) <= target_tokens {
            return Ok(text.trim().to_string());
        }

        // token estimate is ceil(chars / 4); aim for the target with a 20%
        // ceiling margin
        let max_chars = (target_tokens as usize) * 4;
        let mut result = String::new();

        for sentence in split_sentences(text) {
            if result.chars().count() + sentence.chars().count() > max_chars {
                break;
            }
            if !result.is_empty() {
                result.push(' ');
            }
            result.push_str(sentence);
        }

        if result.is_empty() {
            // a single sentence longer than the budget: hard character cut
            result = text.chars().take(max_chars).collect();
        }

        Ok(result.trim().to_string())
    }
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
