use crate::errors::PlatformError;
use crate::platform::{all_review_comments, ExistingComment, PlatformClient, PullRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the hunk component of a key is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Exact string equality on the full hunk or patch text.
    #[default]
    Exact,
    /// Trimmed first line of the hunk only.
    FirstLine,
}

impl KeyPolicy {
    fn normalize_hunk(self, hunk: &str) -> String {
        match self {
            KeyPolicy::Exact => hunk.to_string(),
            KeyPolicy::FirstLine => hunk.trim().lines().next().unwrap_or_default().to_string(),
        }
    }
}

/// Identity of a review comment for duplicate detection. The line number is
/// not part of it: the same complaint about the same change counts once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExistingCommentKey {
    pub commit_id: String,
    pub hunk: String,
    pub body: String,
}

/// Keys of every review comment on a pull request, under one [`KeyPolicy`].
#[derive(Debug, Clone, Default)]
pub struct CommentKeySet {
    policy: KeyPolicy,
    keys: HashSet<ExistingCommentKey>,
}

impl CommentKeySet {
    pub fn new(policy: KeyPolicy) -> Self {
        Self {
            policy,
            keys: HashSet::new(),
        }
    }

    pub fn from_comments<'a>(
        policy: KeyPolicy,
        comments: impl IntoIterator<Item = &'a ExistingComment>,
    ) -> Self {
        let mut set = Self::new(policy);
        for comment in comments {
            set.insert(&comment.commit_id, &comment.diff_hunk, &comment.body);
        }
        set
    }

    pub fn key(&self, commit_id: &str, hunk: &str, body: &str) -> ExistingCommentKey {
        ExistingCommentKey {
            commit_id: commit_id.to_string(),
            hunk: self.policy.normalize_hunk(hunk),
            body: body.to_string(),
        }
    }

    pub fn insert(&mut self, commit_id: &str, hunk: &str, body: &str) -> bool {
        let key = self.key(commit_id, hunk, body);
        self.keys.insert(key)
    }

    pub fn contains(&self, commit_id: &str, hunk: &str, body: &str) -> bool {
        is_duplicate(&self.key(commit_id, hunk, body), self)
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExistingCommentKey> {
        self.keys.iter()
    }
}

/// `key` must already be normalized under `set`'s policy; build it with
/// [`CommentKeySet::key`].
pub fn is_duplicate(key: &ExistingCommentKey, set: &CommentKeySet) -> bool {
    set.keys.contains(key)
}

/// Fetches every review comment on the pull request, across all pages, and
/// keys them. Rebuilt on every review run.
pub async fn build_existing_key_set(
    platform: &dyn PlatformClient,
    pr: &PullRequest,
    policy: KeyPolicy,
) -> Result<CommentKeySet, PlatformError> {
    let comments = all_review_comments(platform, pr).await?;
    let set = CommentKeySet::from_comments(policy, &comments);
    tracing::debug!(
        comments = comments.len(),
        keys = set.len(),
        "built existing comment key set"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(commit: &str, hunk: &str, body: &str) -> ExistingComment {
        ExistingComment {
            commit_id: commit.to_string(),
            diff_hunk: hunk.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn exact_policy_requires_identical_text() {
        let comments = vec![existing("abc", "@@ -1 +1 @@\n-a\n+b", "typo")];
        let set = CommentKeySet::from_comments(KeyPolicy::Exact, &comments);

        assert!(set.contains("abc", "@@ -1 +1 @@\n-a\n+b", "typo"));
        assert!(!set.contains("abc", "@@ -1 +1 @@\n-a\n+b\n", "typo"));
        assert!(!set.contains("abc", "@@ -1 +1 @@\n-a\n+b", "typo "));
    }

    #[test]
    fn new_commit_is_not_a_duplicate() {
        let comments = vec![existing("abc", "hunk", "typo")];
        let set = CommentKeySet::from_comments(KeyPolicy::Exact, &comments);
        assert!(!set.contains("def", "hunk", "typo"));
    }

    #[test]
    fn first_line_policy_normalizes_both_sides() {
        let comments = vec![existing("abc", "  @@ -1,2 +1,2 @@\n-a\n+b", "typo")];
        let set = CommentKeySet::from_comments(KeyPolicy::FirstLine, &comments);
        assert!(set.contains("abc", "@@ -1,2 +1,2 @@\n different body\n", "typo"));
        assert!(!set.contains("abc", "@@ -9 +9 @@", "typo"));
    }

    #[test]
    fn identical_keys_collapse() {
        let comments = vec![
            existing("abc", "hunk", "typo"),
            existing("abc", "hunk", "typo"),
            existing("abc", "hunk", "other"),
        ];
        let set = CommentKeySet::from_comments(KeyPolicy::Exact, &comments);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn is_duplicate_matches_set_membership() {
        let mut set = CommentKeySet::new(KeyPolicy::Exact);
        assert!(set.insert("abc", "hunk", "typo"));
        let key = set.key("abc", "hunk", "typo");
        assert!(is_duplicate(&key, &set));
        assert!(!set.insert("abc", "hunk", "typo"));
    }
}
