use serde::{Deserialize, Serialize};

/// A finding reported by an analyzer: a 1-based line in the post-change file
/// and the comment text to attach there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub line: u32,
    pub comment: String,
}

impl Finding {
    pub fn new(line: u32, comment: impl Into<String>) -> Self {
        Self {
            line,
            comment: comment.into(),
        }
    }
}

/// Which side of the diff a comment is anchored to. Comments are only ever
/// placed on the post-change file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Right,
}

/// A review comment waiting to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: u32,
    pub side: Side,
    pub body: String,
}

impl ReviewComment {
    /// Comments only ever target the post-change side.
    pub fn on_new_line(path: &str, finding: Finding) -> Self {
        Self {
            path: path.to_string(),
            line: finding.line,
            side: Side::Right,
            body: finding.comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Success,
    Failure,
}

/// Terminal result of one review run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    pub message: String,
}

impl ReviewOutcome {
    pub const NO_ISSUES: &'static str = "No issues found";
    pub const POSTED: &'static str = "Review comments posted successfully";

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ReviewStatus::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ReviewStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReviewStatus::Success
    }
}
