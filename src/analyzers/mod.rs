pub mod llm_review;
pub mod prompt;
pub mod spelling;

use crate::core::{ChangePart, ExistingCommentKey, Finding};
use crate::errors::AnalyzerError;
use async_trait::async_trait;

pub use llm_review::LlmReviewAnalyzer;
pub use spelling::SpellingAnalyzer;

/// Fast, local analysis of a whole file. Findings are filtered to changed
/// lines by the caller.
pub trait TextAnalyzer: Send + Sync {
    fn id(&self) -> &str;
    fn analyze(&self, content: &str) -> Result<Vec<Finding>, AnalyzerError>;
}

/// Everything a review analyzer gets to see about one changed file.
#[derive(Debug, Clone)]
pub struct ReviewInput<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub diff_text: &'a str,
    pub changed_parts: &'a [ChangePart],
    pub existing_keys: Vec<&'a ExistingCommentKey>,
}

/// Remote, model-backed review. Implementations swallow their own failures
/// and return no findings instead.
#[async_trait]
pub trait ReviewAnalyzer: Send + Sync {
    fn id(&self) -> &str;
    async fn review(&self, input: ReviewInput<'_>) -> Vec<Finding>;
}
