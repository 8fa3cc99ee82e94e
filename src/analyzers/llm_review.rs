use crate::adapters::llm::{LLMAdapter, LLMRequest};
use crate::analyzers::prompt::{PromptBuilder, PromptConfig};
use crate::analyzers::{ReviewAnalyzer, ReviewInput};
use crate::core::Finding;
use async_trait::async_trait;
use serde::Deserialize;

/// Asks a language model to review a changed file and turns its JSON reply
/// into findings.
pub struct LlmReviewAnalyzer {
    adapter: Box<dyn LLMAdapter>,
    prompts: PromptBuilder,
}

#[derive(Deserialize)]
struct RawFinding {
    line: Option<u32>,
    #[serde(alias = "text")]
    comment: Option<String>,
}

impl LlmReviewAnalyzer {
    pub fn new(adapter: Box<dyn LLMAdapter>, prompt: PromptConfig) -> Self {
        Self {
            adapter,
            prompts: PromptBuilder::new(prompt),
        }
    }
}

#[async_trait]
impl ReviewAnalyzer for LlmReviewAnalyzer {
    fn id(&self) -> &str {
        "llm_review"
    }

    async fn review(&self, input: ReviewInput<'_>) -> Vec<Finding> {
        let (system_prompt, user_prompt) = self.prompts.build_prompt(&input);
        tracing::info!(
            file = input.path,
            model = self.adapter.model_name(),
            "Sending changes to LLM for review"
        );

        let response = match self
            .adapter
            .complete(LLMRequest {
                system_prompt,
                user_prompt,
                temperature: None,
                max_tokens: None,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(file = input.path, error = %e, "LLM review request failed");
                return Vec::new();
            }
        };

        match parse_findings(&response.content) {
            Ok(findings) => findings,
            Err(e) => {
                tracing::warn!(file = input.path, error = %e, "Could not parse LLM review response");
                Vec::new()
            }
        }
    }
}

/// Extracts the JSON array of `{line, comment}` objects from a model reply,
/// ignoring code fences and surrounding prose. Entries without a positive
/// line or a non-empty comment are dropped.
pub fn parse_findings(content: &str) -> Result<Vec<Finding>, serde_json::Error> {
    let trimmed = content.trim();
    let array = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Ok(Vec::new()),
    };

    let raw: Vec<RawFinding> = serde_json::from_str(array)?;
    Ok(raw
        .into_iter()
        .filter_map(|r| match (r.line, r.comment) {
            (Some(line), Some(comment)) if line > 0 && !comment.trim().is_empty() => {
                Some(Finding::new(line, comment.trim()))
            }
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::LLMResponse;
    use anyhow::Result;

    struct CannedAdapter(Result<String, String>);

    #[async_trait]
    impl LLMAdapter for CannedAdapter {
        async fn complete(&self, _request: LLMRequest) -> Result<LLMResponse> {
            match &self.0 {
                Ok(content) => Ok(LLMResponse {
                    content: content.clone(),
                    model: "canned".to_string(),
                    usage: None,
                }),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn input() -> ReviewInput<'static> {
        ReviewInput {
            path: "README.md",
            content: "Hello\n",
            diff_text: "@@ -0,0 +1 @@\n+Hello\n",
            changed_parts: &[],
            existing_keys: Vec::new(),
        }
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here you go:\n```json\n[{\"line\": 3, \"comment\": \"Missing article\"}]\n```";
        assert_eq!(
            parse_findings(reply).unwrap(),
            vec![Finding::new(3, "Missing article")]
        );
    }

    #[test]
    fn accepts_text_alias_and_drops_incomplete_entries() {
        let reply = r#"[{"line": 1, "text": "Passive voice"}, {"line": 0, "comment": "x"},
                        {"comment": "no line"}, {"line": 4, "comment": "  "}]"#;
        assert_eq!(
            parse_findings(reply).unwrap(),
            vec![Finding::new(1, "Passive voice")]
        );
    }

    #[test]
    fn reply_without_array_has_no_findings() {
        assert!(parse_findings("Looks good to me.").unwrap().is_empty());
    }

    #[tokio::test]
    async fn adapter_failure_yields_no_findings() {
        let analyzer = LlmReviewAnalyzer::new(
            Box::new(CannedAdapter(Err("timeout".to_string()))),
            PromptConfig::default(),
        );
        assert!(analyzer.review(input()).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_yields_no_findings() {
        let analyzer = LlmReviewAnalyzer::new(
            Box::new(CannedAdapter(Ok("[{\"line\": \"three\"}]".to_string()))),
            PromptConfig::default(),
        );
        assert!(analyzer.review(input()).await.is_empty());
    }

    #[tokio::test]
    async fn returns_parsed_findings() {
        let analyzer = LlmReviewAnalyzer::new(
            Box::new(CannedAdapter(Ok(r#"[{"line":1,"comment":"Say hi"}]"#.to_string()))),
            PromptConfig::default(),
        );
        assert_eq!(analyzer.review(input()).await, vec![Finding::new(1, "Say hi")]);
    }
}
