use crate::analyzers::ReviewInput;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(path|content|diff|changed|existing)\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub max_file_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: r#"You are a meticulous technical editor reviewing documentation changes in a pull request. Point out problems a reader would trip over:
- Grammar, spelling and punctuation mistakes
- Unclear, ambiguous or misleading sentences
- Broken Markdown structure (headings, lists, links, code fences)
- Statements that contradict the rest of the document

Only comment on lines that were added or changed. Do not repeat an existing comment."#
                .to_string(),
            user_prompt_template: r#"<file path="{path}">
{content}
</file>

<diff>
{diff}
</diff>

<changed_lines>
{changed}
</changed_lines>

<existing_comments>
{existing}
</existing_comments>

<instructions>
Respond with a JSON array and nothing else. Each element must look like:
{"line": <line number in the new version of the file>, "comment": "<review comment>"}
Respond with [] when there is nothing worth pointing out.
</instructions>"#
                .to_string(),
            max_file_chars: 40_000,
        }
    }
}

pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Returns `(system_prompt, user_prompt)`. Placeholders are filled in a
    /// single pass over the template, so file or diff text that happens to
    /// contain `{diff}` and the like is inserted verbatim.
    pub fn build_prompt(&self, input: &ReviewInput<'_>) -> (String, String) {
        let content = self.format_content(input.content);
        let changed = Self::format_changed(input);
        let existing = Self::format_existing(input);

        let user_prompt = PLACEHOLDER
            .replace_all(&self.config.user_prompt_template, |caps: &Captures<'_>| {
                match &caps[1] {
                    "path" => input.path,
                    "content" => content.as_str(),
                    "diff" => input.diff_text,
                    "changed" => changed.as_str(),
                    _ => existing.as_str(),
                }
                .to_string()
            })
            .into_owned();

        (self.config.system_prompt.clone(), user_prompt)
    }

    fn format_content(&self, content: &str) -> String {
        let mut output = String::new();
        for (idx, line) in content.lines().enumerate() {
            let numbered = format!("{:>5} | {}\n", idx + 1, line);
            if self.config.max_file_chars > 0
                && output.len().saturating_add(numbered.len()) > self.config.max_file_chars
            {
                output.push_str("[File truncated]\n");
                break;
            }
            output.push_str(&numbered);
        }
        output
    }

    fn format_changed(input: &ReviewInput<'_>) -> String {
        input
            .changed_parts
            .iter()
            .map(|part| format!("Line {}: {}", part.target_line_no, part.changed_text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_existing(input: &ReviewInput<'_>) -> String {
        if input.existing_keys.is_empty() {
            return "(none)".to_string();
        }
        input
            .existing_keys
            .iter()
            .map(|key| format!("- {}", key.body))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
