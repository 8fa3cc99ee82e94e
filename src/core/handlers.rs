use crate::adapters::llm::create_adapter;
use crate::analyzers::{LlmReviewAnalyzer, ReviewAnalyzer, SpellingAnalyzer, TextAnalyzer};
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMatcher {
    /// Case-sensitive filename suffix, e.g. `.md`.
    Suffix(String),
}

impl FileMatcher {
    pub fn matches(&self, filename: &str) -> bool {
        match self {
            FileMatcher::Suffix(suffix) => filename.ends_with(suffix.as_str()),
        }
    }
}

/// The analyzers run over one kind of file.
#[derive(Clone)]
pub struct FilePipeline {
    pub name: String,
    pub fast: Vec<Arc<dyn TextAnalyzer>>,
    pub llm: Option<Arc<dyn ReviewAnalyzer>>,
}

impl FilePipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fast: Vec::new(),
            llm: None,
        }
    }

    pub fn with_fast(mut self, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        self.fast.push(analyzer);
        self
    }

    pub fn with_llm(mut self, analyzer: Arc<dyn ReviewAnalyzer>) -> Self {
        self.llm = Some(analyzer);
        self
    }
}

impl std::fmt::Debug for FilePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePipeline")
            .field("name", &self.name)
            .field("fast", &self.fast.iter().map(|a| a.id()).collect::<Vec<_>>())
            .field("llm", &self.llm.as_ref().map(|a| a.id()))
            .finish()
    }
}

/// Maps filenames to pipelines. Matchers are tried in registration order;
/// files nobody claims are not reviewed.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<(FileMatcher, FilePipeline)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one pipeline per configured handler. The LLM analyzer is left
    /// out with a warning when no model can be configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let spelling: Arc<dyn TextAnalyzer> =
            Arc::new(SpellingAnalyzer::from_config(&config.spelling)?);

        let wants_llm = config.review.handlers.iter().any(|h| h.llm);
        let llm: Option<Arc<dyn ReviewAnalyzer>> = if wants_llm {
            match create_adapter(&config.model_config()) {
                Ok(adapter) => Some(Arc::new(LlmReviewAnalyzer::new(
                    adapter,
                    config.prompt_config(),
                ))),
                Err(e) => {
                    tracing::warn!(error = %e, "LLM review disabled");
                    None
                }
            }
        } else {
            None
        };

        let mut registry = Self::new();
        for handler in &config.review.handlers {
            let mut pipeline = FilePipeline::new(handler.name.clone());
            if handler.spelling {
                pipeline = pipeline.with_fast(spelling.clone());
            }
            if handler.llm {
                if let Some(analyzer) = &llm {
                    pipeline = pipeline.with_llm(analyzer.clone());
                }
            }
            registry.register(FileMatcher::Suffix(handler.suffix.clone()), pipeline);
        }
        Ok(registry)
    }

    pub fn register(&mut self, matcher: FileMatcher, pipeline: FilePipeline) {
        tracing::debug!(pipeline = %pipeline.name, ?matcher, "Registered file handler");
        self.handlers.push((matcher, pipeline));
    }

    pub fn resolve(&self, filename: &str) -> Option<&FilePipeline> {
        self.handlers
            .iter()
            .find(|(matcher, _)| matcher.matches(filename))
            .map(|(_, pipeline)| pipeline)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
