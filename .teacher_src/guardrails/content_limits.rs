//! Built-in content limits provider for guardrails.
//!
//! This provider enforces size constraints on content without requiring
//! external API calls.
//!
//! # Example Configuration
//!
//! ```toml
//! [features.guardrails.input.provider]
//! type = "content_limits"
//! max_characters = 10000
//! max_words = 2000
//! max_lines = 100
//! ```

use std::time::Instant;

use async_trait::async_trait;
use tracing::instrument;

use super::{
    Category, GuardrailsProvider, GuardrailsRequest, GuardrailsResponse, GuardrailsResult,
    Severity, Violation,
};

/// Configuration for content limits.
#[derive(Debug, Clone, Default)]
pub struct ContentLimitsConfig {
    /// Maximum number of characters allowed.
    pub max_characters: Option<usize>,
    /// Maximum number of words allowed.
    pub max_words: Option<usize>,
    /// Maximum number of lines allowed.
    pub max_lines: Option<usize>,
}

/// Built-in content limits guardrails provider.
///
/// Enforces size constraints on content locally, without making any external
/// API calls.
pub struct ContentLimitsProvider {
    config: ContentLimitsConfig,
}

impl ContentLimitsProvider {
    /// Creates a new content limits provider with the specified configuration.
    pub fn new(config: ContentLimitsConfig) -> Self {
        Self { config }
    }

    /// Counts the number of words in the text.
    fn count_words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Counts the number of lines in the text.
    fn count_lines(text: &str) -> usize {
        if text.is_empty() {
            0
        } else {
            text.lines().count()
        }
    }
}

#[async_trait]
impl GuardrailsProvider for ContentLimitsProvider {
    fn name(&self) -> &str {
        "content_limits"
    }

    #[instrument(
        skip(self, request),
        fields(
            provider = "content_limits",
            text_length = request.text.len()
        )
    )]
    async fn evaluate(&self, request: &GuardrailsRequest) -> GuardrailsResult<GuardrailsResponse> {
        let start = Instant::now();
        let mut violations = Vec::new();

        let char_count = request.text.chars().count();
        if let Some(max_chars) = self.config.max_characters
            && char_count > max_chars
        {
            violations.push(
                Violation::new(
                    Category::Custom("content_limit_characters".to_string()),
                    Severity::High,
                    1.0,
                )
                .with_message(format!(
                    "Content exceeds character limit: {} characters (max: {})",
                    char_count, max_chars
                )),
            );
        }

        if let Some(max_words) = self.config.max_words {
            let word_count = Self::count_words(&request.text);
            if word_count > max_words {
                violations.push(
                    Violation::new(
                        Category::Custom("content_limit_words".to_string()),
                        Severity::High,
                        1.0,
                    )
                    .with_message(format!(
                        "Content exceeds word limit: {} words (max: {})",
                        word_count, max_words
                    )),
                );
            }
        }

        if let Some(max_lines) = self.config.max_lines {
            let line_count = Self::count_lines(&request.text);
            if line_count > max_lines {
                violations.push(
                    Violation::new(
                        Category::Custom("content_limit_lines".to_string()),
                        Severity::High,
                        1.0,
                    )
                    .with_message(format!(
                        "Content exceeds line limit: {} lines (max: {})",
                        line_count, max_lines
                    )),
                );
            }
        }

        let latency_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            violation_count = violations.len(),
            latency_ms = latency_ms,
            "Content limits evaluation complete"
        );

        Ok(GuardrailsResponse::with_violations(violations).with_latency(latency_ms))
    }

    fn supported_categories(&self) -> &[Category] {
        // Content limits uses custom categories
        &[]
    }
}
