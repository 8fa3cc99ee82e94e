//! Repository platform collaborator.
//!
//! The review core talks to the platform only through [`PlatformClient`].
//! [`github::GitHubClient`] is the production implementation; tests plug in
//! in-memory fakes.

pub mod github;

use crate::core::ReviewComment;
use crate::errors::PlatformError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;

pub use github::{GitHubAuth, GitHubClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// "owner/repo".
    pub repo: String,
    pub number: u64,
    pub head_sha: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Platform-reported totals used to drive pagination.
    pub changed_files: usize,
    pub review_comments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    /// Per-file patch without file headers. Absent for binary files and
    /// for changes too large for the platform to render.
    pub patch: Option<String>,
}

/// A review comment already present on the pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingComment {
    pub commit_id: String,
    pub diff_hunk: String,
    pub body: String,
}

/// One page of a listing plus the total number of items across all pages.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PlatformError>;

    async fn get_repository(&self, repo: &str) -> Result<Repository, PlatformError>;

    async fn get_file_content(
        &self,
        repo: &Repository,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, PlatformError>;

    /// `page` is 1-based.
    async fn list_changed_files(
        &self,
        pr: &PullRequest,
        page: u32,
    ) -> Result<Page<ChangedFile>, PlatformError>;

    /// `page` is 1-based.
    async fn list_review_comments(
        &self,
        pr: &PullRequest,
        page: u32,
    ) -> Result<Page<ExistingComment>, PlatformError>;

    /// Posts all comments as one review. Either every comment lands or the
    /// call fails.
    async fn post_review_comments(
        &self,
        repo: &str,
        number: u64,
        comments: &[ReviewComment],
    ) -> Result<(), PlatformError>;
}

/// Follows a paginated listing until the collected count reaches the
/// reported total. An empty page also ends the walk.
pub async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, PlatformError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, PlatformError>>,
{
    let mut all = Vec::new();
    let mut page_no = 1;

    loop {
        let page = fetch_page(page_no).await?;
        let fetched = page.items.len();
        all.extend(page.items);

        if all.len() >= page.total_count {
            break;
        }
        if fetched == 0 {
            tracing::warn!(
                collected = all.len(),
                total = page.total_count,
                "pagination ended before reaching the reported total"
            );
            break;
        }
        page_no += 1;
    }

    Ok(all)
}

pub async fn all_changed_files(
    platform: &dyn PlatformClient,
    pr: &PullRequest,
) -> Result<Vec<ChangedFile>, PlatformError> {
    collect_pages(|page| platform.list_changed_files(pr, page)).await
}

pub async fn all_review_comments(
    platform: &dyn PlatformClient,
    pr: &PullRequest,
) -> Result<Vec<ExistingComment>, PlatformError> {
    collect_pages(|page| platform.list_review_comments(pr, page)).await
}
