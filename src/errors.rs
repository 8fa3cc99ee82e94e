//! Error types shared by the review core and its collaborators.
//!
//! Each failure category from a review run has its own type, and
//! [`ReviewError`] gathers them so the orchestrator can compose fallible
//! steps with `?`.

use thiserror::Error;

/// Result alias for the review core.
pub type ReviewResult<T> = Result<T, ReviewError>;

/// Root error for one review run. Anything reaching the top of
/// [`crate::core::Reviewer`] becomes a failed outcome.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Diff(#[from] DiffParseError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// A file's patch text is not valid unified-diff grammar.
#[derive(Debug, Error)]
#[error("failed to parse diff for '{filename}': {source}")]
pub struct DiffParseError {
    pub filename: String,
    #[source]
    pub source: DiffSyntaxError,
}

/// The grammar violation behind a [`DiffParseError`]. Line numbers count
/// from 1 within the patch text, file header excluded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffSyntaxError {
    #[error("missing file header")]
    MissingFileHeader,

    #[error("invalid hunk header at line {line_no}: {header}")]
    InvalidHunkHeader { line_no: usize, header: String },

    #[error("unexpected line {line_no} inside hunk: {line}")]
    UnexpectedHunkLine { line_no: usize, line: String },

    #[error("unexpected line {line_no} outside any hunk: {line}")]
    UnexpectedLine { line_no: usize, line: String },

    #[error("hunk starting at line {line_no} is shorter than its header declares")]
    HunkTooShort { line_no: usize },

    #[error("line {line_no} is numbered past the largest supported line number")]
    LineNumberOverflow { line_no: usize },
}

/// Failures talking to the repository platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to fetch {resource}: {reason}")]
    Fetch { resource: String, reason: String },

    #[error("platform authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Post(#[from] PostFailure),
}

impl PlatformError {
    pub fn fetch(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

/// Why a batched review post was rejected. The display text is what the
/// caller of a review run gets to see.
#[derive(Debug, Error)]
pub enum PostFailure {
    #[error("Forbidden: You may not have permissions to post a comment.")]
    PermissionDenied { detail: String },

    #[error("Validation failed: There may be a problem with the request payload.")]
    ValidationFailed { detail: String },

    #[error("Platform request failed: {0}")]
    Unknown(String),
}

/// An analyzer could not produce findings for a file.
#[derive(Debug, Error)]
#[error("analyzer '{analyzer}' failed: {reason}")]
pub struct AnalyzerError {
    pub analyzer: String,
    pub reason: String,
}

impl AnalyzerError {
    pub fn new(analyzer: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            analyzer: analyzer.into(),
            reason: reason.to_string(),
        }
    }
}
