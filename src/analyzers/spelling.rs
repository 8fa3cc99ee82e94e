use crate::analyzers::TextAnalyzer;
use crate::config::SpellingConfig;
use crate::core::Finding;
use crate::errors::AnalyzerError;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"));

const SYSTEM_DICTIONARIES: &[&str] = &[
    "/usr/share/dict/words",
    "/usr/share/dict/american-english",
    "/usr/share/dict/british-english",
];

const MAX_EDIT2_LEN: usize = 12;

/// Frequency-ranked word list compiled into the binary, so spell checking
/// works without any dictionary installed on the host.
const BUILTIN_WORDS: &str = include_str!("words.txt");

/// Technical vocabulary that general-purpose word lists tend to miss.
const KNOWN_WORDS: &[&str] = &[
    "markdown", "github", "gitlab", "watsonx", "llm", "llms", "pr", "prs", "app", "codebase",
    "multi", "golang", "postgres", "postgresql", "api", "apis", "webhook", "webhooks", "json",
    "yaml", "yml", "toml", "ini", "xml", "cli", "sdk", "docker", "git", "jenkins", "kubernetes",
    "slack", "python", "java", "javascript", "typescript", "nodejs", "js", "ruby", "rails",
    "php", "csharp", "dotnet", "cpp", "swift", "rust", "scala", "kotlin", "html", "css", "scss",
    "sass", "elasticsearch", "kibana", "logstash", "prometheus", "grafana", "influxdb", "mongodb",
    "couchdb", "cassandra", "redis", "rabbitmq", "kafka", "nats", "mqtt", "mysql", "mariadb",
    "sqlite", "mssql", "redshift", "bigquery", "dynamodb", "neo4j", "cockroachdb", "firestore",
    "firebase", "etc", "py", "md", "rs", "src", "dist", "bin", "lib", "db", "config", "configs",
    "metadata", "plaintext", "sql", "dev", "prod", "qa", "uat", "txt", "readme", "utils", "util",
    "subfolder", "subfolders", "subdirectory", "subdirectories", "submodule", "submodules",
    "runtime", "runtimes", "env", "envs", "param", "params", "hardcoded", "hardcode", "var",
    "vars", "repo", "repos", "async", "struct", "enum", "impl", "stdout", "stderr", "url",
    "urls", "http", "https", "oauth", "jwt", "regex", "localhost",
];

/// A word list with optional frequencies, used to decide which words are
/// known and which known word is the likeliest correction.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    words: HashMap<String, u64>,
}

impl Lexicon {
    /// One word per line, optionally followed by a frequency count.
    /// Lines starting with `#` are comments.
    pub fn from_word_list(text: &str) -> Self {
        let mut lexicon = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let frequency = fields.next().and_then(|f| f.parse().ok()).unwrap_or(1);
            lexicon.add_with_frequency(word, frequency);
        }
        lexicon
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary {}", path.display()))?;
        Ok(Self::from_word_list(&text))
    }

    pub fn builtin() -> Self {
        Self::from_word_list(BUILTIN_WORDS)
    }

    /// Adds every word of `other`, keeping the higher frequency on overlap.
    pub fn merge(&mut self, other: Lexicon) {
        for (word, frequency) in other.words {
            self.add_with_frequency(&word, frequency);
        }
    }

    pub fn add(&mut self, word: &str) {
        self.add_with_frequency(word, 1);
    }

    fn add_with_frequency(&mut self, word: &str, frequency: u64) {
        let entry = self.words.entry(word.to_lowercase()).or_insert(0);
        *entry = (*entry).max(frequency);
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Most frequent known word within edit distance 1, else 2. Ties go to
    /// the alphabetically first word.
    pub fn correction(&self, word: &str) -> Option<String> {
        let near = edits1(word);
        if let Some(best) = self.best_known(near.iter()) {
            return Some(best);
        }
        if word.chars().count() > MAX_EDIT2_LEN {
            return None;
        }
        let far: HashSet<String> = near.iter().flat_map(|w| edits1(w)).collect();
        self.best_known(far.iter())
    }

    fn best_known<'a>(&self, candidates: impl Iterator<Item = &'a String>) -> Option<String> {
        candidates
            .filter_map(|c| self.words.get(c).map(|freq| (c, *freq)))
            .max_by(|(a, fa), (b, fb)| fa.cmp(fb).then_with(|| b.cmp(a)))
            .map(|(c, _)| c.clone())
    }
}

fn edits1(word: &str) -> HashSet<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut out = HashSet::new();

    for i in 0..=chars.len() {
        let (left, right) = chars.split_at(i);
        let left: String = left.iter().collect();

        if let Some((_, rest)) = right.split_first() {
            let rest: String = rest.iter().collect();
            out.insert(format!("{left}{rest}"));

            if rest.chars().next().is_some() {
                let mut swapped = right.to_vec();
                swapped.swap(0, 1);
                out.insert(format!("{left}{}", swapped.iter().collect::<String>()));
            }

            for c in 'a'..='z' {
                out.insert(format!("{left}{c}{rest}"));
            }
        }

        let right: String = right.iter().collect();
        for c in 'a'..='z' {
            out.insert(format!("{left}{c}{right}"));
        }
    }

    out.remove(word);
    out
}

/// Splits `camelCase`, `PascalCase` and `HTTPServer` style identifiers into
/// their alphabetic words.
fn split_camel(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, &c) in chars.iter().enumerate() {
        if !c.is_alphabetic() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }

        let prev = idx.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(idx + 1).copied();
        let boundary = c.is_uppercase()
            && match prev {
                Some(p) if p.is_lowercase() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
        if boundary && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Candidate words on one line, lowercased, split out of snake_case and
/// CamelCase identifiers, in order of first appearance.
fn line_words(line: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words = Vec::new();

    for token in WORD.find_iter(line).map(|m| m.as_str()) {
        if token.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        for piece in token.split('_').filter(|p| !p.is_empty()) {
            for word in split_camel(piece) {
                let word = word.to_lowercase();
                if word.chars().count() == 1 && word != "a" && word != "i" {
                    continue;
                }
                if seen.insert(word.clone()) {
                    words.push(word);
                }
            }
        }
    }

    words
}

pub struct SpellingAnalyzer {
    lexicon: Lexicon,
}

impl SpellingAnalyzer {
    pub fn new(mut lexicon: Lexicon) -> Self {
        for word in KNOWN_WORDS {
            lexicon.add(word);
        }
        Self { lexicon }
    }

    /// Starts from the built-in word list and merges in the configured
    /// dictionary, or the first system word list found when none is
    /// configured. A configured dictionary that cannot be read is an error.
    pub fn from_config(config: &SpellingConfig) -> Result<Self> {
        let mut lexicon = Lexicon::builtin();

        let extra = match &config.dictionary {
            Some(path) => Some(path.clone()),
            None => SYSTEM_DICTIONARIES
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists()),
        };
        if let Some(path) = extra {
            lexicon.merge(Lexicon::load(&path)?);
            tracing::info!(dictionary = %path.display(), "Merged spelling dictionary");
        }

        for word in &config.known_words {
            lexicon.add(word);
        }
        tracing::info!(words = lexicon.len(), "Spelling lexicon ready");
        Ok(Self::new(lexicon))
    }
}

impl TextAnalyzer for SpellingAnalyzer {
    fn id(&self) -> &str {
        "spelling"
    }

    fn analyze(&self, content: &str) -> Result<Vec<Finding>, AnalyzerError> {
        let mut findings = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            for word in line_words(line) {
                if self.lexicon.contains(&word) {
                    continue;
                }
                let comment = match self.lexicon.correction(&word) {
                    Some(correction) => format!(
                        "Possible spelling mistake: '{word}'. Did you mean '{correction}'?"
                    ),
                    None => format!("Is this a spelling mistake?: '{word}'"),
                };
                findings.push(Finding::new(line_no, comment));
            }
        }

        tracing::debug!(issues = findings.len(), "Spelling review complete");
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(words: &str) -> SpellingAnalyzer {
        SpellingAnalyzer::new(Lexicon::from_word_list(words))
    }

    #[test]
    fn splits_identifiers() {
        assert_eq!(split_camel("camelCase"), vec!["camel", "Case"]);
        assert_eq!(split_camel("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_camel("Plain"), vec!["Plain"]);
        assert_eq!(
            line_words("read_config parseJSONValue x a"),
            vec!["read", "config", "parse", "json", "value", "a"]
        );
    }

    #[test]
    fn skips_tokens_with_digits_and_repeats() {
        assert_eq!(line_words("v2 build 42 build"), vec!["build"]);
    }

    #[test]
    fn flags_unknown_words_with_correction() {
        let spell = analyzer("the\nquick\nbrown\nfox\n");
        let findings = spell.analyze("the quick\nthe quikc brown fox\n").unwrap();
        assert_eq!(
            findings,
            vec![Finding::new(
                2,
                "Possible spelling mistake: 'quikc'. Did you mean 'quick'?"
            )]
        );
    }

    #[test]
    fn no_candidate_asks_instead() {
        let spell = analyzer("hello\n");
        let findings = spell.analyze("zzzzzzzz").unwrap();
        assert_eq!(findings[0].comment, "Is this a spelling mistake?: 'zzzzzzzz'");
    }

    #[test]
    fn prefers_frequent_candidates() {
        let lexicon = Lexicon::from_word_list("cat 5\ncar 900\n# comment\n");
        assert_eq!(lexicon.correction("caz").as_deref(), Some("car"));
    }

    #[test]
    fn reaches_distance_two() {
        let lexicon = Lexicon::from_word_list("review\n");
        assert_eq!(lexicon.correction("reveiw").as_deref(), Some("review"));
        assert_eq!(lexicon.correction("rviw").as_deref(), Some("review"));
        assert_eq!(lexicon.correction("abcdef").as_deref(), None);
    }

    #[test]
    fn builtin_vocabulary_is_known() {
        let spell = analyzer("configure\nthe\nfor\n");
        assert!(spell.analyze("Configure the webhook for github").unwrap().is_empty());
    }

    #[test]
    fn missing_dictionary_is_an_error() {
        let config = SpellingConfig {
            dictionary: Some(PathBuf::from("/nonexistent/words.txt")),
            known_words: Vec::new(),
        };
        assert!(SpellingAnalyzer::from_config(&config).is_err());
    }

    #[test]
    fn loads_configured_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        std::fs::write(&path, "alpha\nbeta\n").unwrap();
        let config = SpellingConfig {
            dictionary: Some(path),
            known_words: vec!["gamma".to_string()],
        };
        let spell = SpellingAnalyzer::from_config(&config).unwrap();
        assert!(spell.analyze("alpha beta gamma").unwrap().is_empty());
    }

    #[test]
    fn default_config_checks_with_builtin_words() {
        let spell = SpellingAnalyzer::from_config(&SpellingConfig::default()).unwrap();
        let findings = spell
            .analyze("Please read the documnet.\nRun teh tests before the release.\n")
            .unwrap();
        assert_eq!(
            findings,
            vec![
                Finding::new(1, "Possible spelling mistake: 'documnet'. Did you mean 'document'?"),
                Finding::new(2, "Possible spelling mistake: 'teh'. Did you mean 'the'?"),
            ]
        );
    }

    #[test]
    fn builtin_list_ranks_common_words_higher() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.contains("receive"));
        assert_eq!(lexicon.correction("recieve").as_deref(), Some("receive"));
    }
}
