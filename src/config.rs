use crate::adapters::llm::{ModelConfig, Provider};
use crate::analyzers::prompt::PromptConfig;
use crate::core::KeyPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "reviewbot.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub spelling: SpellingConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: Option<String>,
    pub app_id: Option<String>,
    pub installation_id: Option<String>,
    /// PEM-encoded GitHub App private key.
    pub private_key: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Pull requests without this label are skipped. `None` reviews everything.
    #[serde(default = "default_review_label")]
    pub review_label: Option<String>,

    #[serde(default = "default_actions")]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub dedup_key: KeyPolicy,

    #[serde(default = "default_handlers")]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub name: String,
    pub suffix: String,

    #[serde(default = "default_true")]
    pub spelling: bool,

    #[serde(default = "default_true")]
    pub llm: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellingConfig {
    /// Word list, one word per line with an optional frequency column.
    pub dictionary: Option<PathBuf>,

    #[serde(default)]
    pub known_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Replaces the built-in reviewer instructions.
    pub prompt: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            app_id: None,
            installation_id: None,
            private_key: None,
            webhook_secret: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            review_label: default_review_label(),
            actions: default_actions(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            dedup_key: KeyPolicy::default(),
            handlers: default_handlers(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_url: None,
            api_key: None,
            project_id: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            prompt: None,
        }
    }
}

impl Config {
    /// Loads the first configuration file found, starting with `explicit`,
    /// then `./reviewbot.yml`, `./config/reviewbot.yml` and `~/.reviewbot.yml`.
    /// Falls back to defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut candidates = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new("config").join(CONFIG_FILE_NAME),
        ];
        if let Some(home_dir) = dirs::home_dir() {
            candidates.push(home_dir.join(format!(".{}", CONFIG_FILE_NAME)));
        }

        for path in candidates {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overrides secrets and endpoints from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(app_id) = var("GITHUB_APP_ID") {
            self.github.app_id = Some(app_id);
        }
        if let Some(installation_id) = var("GITHUB_INSTALLATION_ID") {
            self.github.installation_id = Some(installation_id);
        }
        if let Some(key) = var("GITHUB_PRIVATE_KEY") {
            self.github.private_key = Some(key.replace("\\n", "\n"));
        }
        if let Some(url) = var("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(secret) = var("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = Some(secret);
        }

        match self.llm.provider {
            Provider::Watsonx => {
                if let Some(url) = var("WATSONX_URL") {
                    self.llm.api_url = Some(url);
                }
                if let Some(key) = var("WATSONX_APIKEY") {
                    self.llm.api_key = Some(key);
                }
                if let Some(project) = var("WATSONX_PROJECT_ID") {
                    self.llm.project_id = Some(project);
                }
            }
            Provider::OpenAI => {
                if let Some(key) = var("OPENAI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: self.llm.provider,
            model_name: self.llm.model.clone(),
            api_key: self.llm.api_key.clone(),
            base_url: self.llm.api_url.clone(),
            project_id: self.llm.project_id.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn prompt_config(&self) -> PromptConfig {
        let mut prompt = PromptConfig::default();
        if let Some(system_prompt) = &self.llm.prompt {
            prompt.system_prompt = system_prompt.clone();
        }
        prompt
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_review_label() -> Option<String> {
    Some("ready-to-review".to_string())
}

fn default_actions() -> Vec<String> {
    ["opened", "synchronize", "reopened", "labeled"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_handlers() -> Vec<HandlerConfig> {
    vec![HandlerConfig {
        name: "markdown".to_string(),
        suffix: ".md".to_string(),
        spelling: true,
        llm: true,
    }]
}

fn default_model() -> String {
    ModelConfig::default().model_name
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> usize {
    900
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_review_markdown_with_label_gate() {
        let config = Config::default();
        assert_eq!(config.server.review_label.as_deref(), Some("ready-to-review"));
        assert_eq!(config.server.actions.len(), 4);
        assert_eq!(config.review.dedup_key, KeyPolicy::Exact);
        assert_eq!(config.review.handlers[0].suffix, ".md");
        assert_eq!(config.github.api_url, "https://api.github.com");
    }

    #[test]
    fn loads_explicit_file_and_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  review_label: docs-review\nreview:\n  dedup_key: first_line\nllm:\n  provider: openai\n  model: gpt-4o"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.review_label.as_deref(), Some("docs-review"));
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.review.dedup_key, KeyPolicy::FirstLine);
        assert_eq!(config.llm.provider, Provider::OpenAI);
        assert_eq!(config.model_config().model_name, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 900);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yml"))).is_err());
    }

    #[test]
    fn env_overrides_secrets() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "ghp_abc"),
            ("GITHUB_PRIVATE_KEY", "-----BEGIN-----\\nKEY\\n-----END-----"),
            ("GITHUB_WEBHOOK_SECRET", "hush"),
            ("WATSONX_APIKEY", "ibm"),
            ("WATSONX_PROJECT_ID", "proj"),
            ("OPENAI_API_KEY", "sk-ignored"),
            ("GITHUB_APP_ID", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
        assert_eq!(
            config.github.private_key.as_deref(),
            Some("-----BEGIN-----\nKEY\n-----END-----")
        );
        assert_eq!(config.github.webhook_secret.as_deref(), Some("hush"));
        assert_eq!(config.github.app_id, None);
        assert_eq!(config.llm.api_key.as_deref(), Some("ibm"));
        assert_eq!(config.llm.project_id.as_deref(), Some("proj"));
    }

    #[test]
    fn custom_prompt_replaces_system_prompt() {
        let mut config = Config::default();
        config.llm.prompt = Some("Be brief.".to_string());
        assert_eq!(config.prompt_config().system_prompt, "Be brief.");
    }
}
