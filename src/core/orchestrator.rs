use crate::analyzers::ReviewInput;
use crate::core::change_parts::changed_parts;
use crate::core::comment::{Finding, ReviewComment, ReviewOutcome};
use crate::core::dedup::{build_existing_key_set, CommentKeySet, KeyPolicy};
use crate::core::diff_parser::DiffParser;
use crate::core::handlers::{FilePipeline, HandlerRegistry};
use crate::core::line_mapper::changed_target_lines;
use crate::errors::{PlatformError, ReviewError, ReviewResult};
use crate::platform::{all_changed_files, PlatformClient, PullRequest, Repository};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Reviews pull requests: runs the registered analyzers over every changed
/// file it has a handler for and posts whatever survives line filtering and
/// duplicate suppression as a single review.
pub struct Reviewer {
    platform: Arc<dyn PlatformClient>,
    handlers: HandlerRegistry,
    key_policy: KeyPolicy,
}

struct FileReview<'a> {
    pr: &'a PullRequest,
    path: &'a str,
    patch: &'a str,
    content: &'a str,
}

impl Reviewer {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        handlers: HandlerRegistry,
        key_policy: KeyPolicy,
    ) -> Self {
        Self {
            platform,
            handlers,
            key_policy,
        }
    }

    /// Never fails: every error becomes a `failure` outcome, and nothing is
    /// posted once an error has occurred.
    pub async fn review_pull_request(&self, repo: &str, number: u64) -> ReviewOutcome {
        info!(repo, pr = number, "Starting pull request review");

        let outcome = match self.run(repo, number).await {
            Ok(outcome) => outcome,
            Err(ReviewError::Platform(PlatformError::Post(failure))) => {
                error!(repo, pr = number, error = ?failure, "Posting review comments failed");
                ReviewOutcome::failure(format!("Failed to post review comments: {}", failure))
            }
            Err(e) => {
                error!(repo, pr = number, error = %e, "Review failed");
                ReviewOutcome::failure(format!("Exception occurred: {}", e))
            }
        };

        info!(
            repo,
            pr = number,
            status = ?outcome.status,
            message = %outcome.message,
            "Finished pull request review"
        );
        outcome
    }

    async fn run(&self, repo_name: &str, number: u64) -> ReviewResult<ReviewOutcome> {
        let pr = self.platform.get_pull_request(repo_name, number).await?;
        let repo = self.platform.get_repository(repo_name).await?;
        debug!(repo = repo_name, pr = number, head = %pr.head_sha, "Fetched pull request");

        let existing = build_existing_key_set(self.platform.as_ref(), &pr, self.key_policy).await?;
        let files = all_changed_files(self.platform.as_ref(), &pr).await?;

        let mut comments = Vec::new();
        for file in &files {
            let Some(pipeline) = self.handlers.resolve(&file.filename) else {
                debug!(file = %file.filename, "No handler for file, skipping");
                continue;
            };
            let Some(patch) = file.patch.as_deref() else {
                debug!(file = %file.filename, "File has no textual patch, skipping");
                continue;
            };

            info!(file = %file.filename, pipeline = %pipeline.name, "Reviewing file");
            let content = self.fetch_text(&repo, &file.filename, &pr.head_sha).await?;
            let review = FileReview {
                pr: &pr,
                path: &file.filename,
                patch,
                content: &content,
            };
            comments.extend(self.review_file(pipeline, &review, &existing).await?);
        }

        if comments.is_empty() {
            return Ok(ReviewOutcome::success(ReviewOutcome::NO_ISSUES));
        }

        info!(repo = repo_name, pr = number, count = comments.len(), "Posting review comments");
        self.platform
            .post_review_comments(repo_name, number, &comments)
            .await?;
        Ok(ReviewOutcome::success(ReviewOutcome::POSTED))
    }

    async fn fetch_text(
        &self,
        repo: &Repository,
        path: &str,
        git_ref: &str,
    ) -> Result<String, PlatformError> {
        let bytes = self.platform.get_file_content(repo, path, git_ref).await?;
        String::from_utf8(bytes).map_err(|e| PlatformError::fetch(path, e))
    }

    async fn review_file(
        &self,
        pipeline: &FilePipeline,
        file: &FileReview<'_>,
        existing: &CommentKeySet,
    ) -> ReviewResult<Vec<ReviewComment>> {
        let patch = DiffParser::parse(file.patch, file.path)?;
        let changed = changed_target_lines(&patch);
        let mut comments = Vec::new();

        for analyzer in &pipeline.fast {
            let findings = analyzer.analyze(file.content)?;
            let total = findings.len();
            let on_changed: Vec<Finding> = findings
                .into_iter()
                .filter(|f| changed.contains(&f.line))
                .collect();
            debug!(
                file = file.path,
                analyzer = analyzer.id(),
                total,
                on_changed_lines = on_changed.len(),
                "Fast analyzer finished"
            );
            comments.extend(self.keep_new(file, on_changed, existing));
        }

        if let Some(llm) = &pipeline.llm {
            let parts = changed_parts(&patch);
            let findings = llm
                .review(ReviewInput {
                    path: file.path,
                    content: file.content,
                    diff_text: file.patch,
                    changed_parts: &parts,
                    existing_keys: existing.iter().collect(),
                })
                .await;
            if findings.is_empty() {
                debug!(file = file.path, analyzer = llm.id(), "No findings from review analyzer");
            }
            comments.extend(self.keep_new(file, findings, existing));
        }

        Ok(comments)
    }

    fn keep_new(
        &self,
        file: &FileReview<'_>,
        findings: Vec<Finding>,
        existing: &CommentKeySet,
    ) -> Vec<ReviewComment> {
        findings
            .into_iter()
            .filter(|f| {
                let duplicate = existing.contains(&file.pr.head_sha, file.patch, &f.comment);
                if duplicate {
                    debug!(file = file.path, line = f.line, "Suppressed duplicate comment");
                }
                !duplicate
            })
            .map(|f| ReviewComment::on_new_line(file.path, f))
            .collect()
    }
}

impl std::fmt::Debug for Reviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reviewer")
            .field("handlers", &self.handlers)
            .field("key_policy", &self.key_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::TextAnalyzer;
    use crate::core::comment::ReviewStatus;
    use crate::errors::{AnalyzerError, PostFailure};
    use crate::platform::{ChangedFile, ExistingComment, Page};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PATCH: &str = "@@ -1,2 +1,2 @@\n Title\n-old line\n+new lnie\n";

    #[derive(Default)]
    struct StubPlatform {
        existing: Vec<ExistingComment>,
        post_error: Option<fn() -> PostFailure>,
        posted: Mutex<Vec<ReviewComment>>,
    }

    #[async_trait]
    impl PlatformClient for StubPlatform {
        async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PlatformError> {
            Ok(PullRequest {
                repo: repo.to_string(),
                number,
                head_sha: "head".to_string(),
                labels: Vec::new(),
                changed_files: 1,
                review_comments: self.existing.len(),
            })
        }

        async fn get_repository(&self, repo: &str) -> Result<Repository, PlatformError> {
            Ok(Repository {
                full_name: repo.to_string(),
                default_branch: None,
            })
        }

        async fn get_file_content(
            &self,
            _repo: &Repository,
            _path: &str,
            _git_ref: &str,
        ) -> Result<Vec<u8>, PlatformError> {
            Ok(b"Title\nnew lnie\n".to_vec())
        }

        async fn list_changed_files(
            &self,
            _pr: &PullRequest,
            _page: u32,
        ) -> Result<Page<ChangedFile>, PlatformError> {
            Ok(Page {
                items: vec![ChangedFile {
                    filename: "guide.md".to_string(),
                    patch: Some(PATCH.to_string()),
                }],
                total_count: 1,
            })
        }

        async fn list_review_comments(
            &self,
            _pr: &PullRequest,
            _page: u32,
        ) -> Result<Page<ExistingComment>, PlatformError> {
            Ok(Page {
                items: self.existing.clone(),
                total_count: self.existing.len(),
            })
        }

        async fn post_review_comments(
            &self,
            _repo: &str,
            _number: u64,
            comments: &[ReviewComment],
        ) -> Result<(), PlatformError> {
            if let Some(make) = self.post_error {
                return Err(make().into());
            }
            self.posted.lock().unwrap().extend_from_slice(comments);
            Ok(())
        }
    }

    struct FlagEveryLine;

    impl TextAnalyzer for FlagEveryLine {
        fn id(&self) -> &str {
            "every_line"
        }

        fn analyze(&self, content: &str) -> Result<Vec<Finding>, AnalyzerError> {
            Ok((1..=content.lines().count() as u32)
                .map(|n| Finding::new(n, format!("line {}", n)))
                .collect())
        }
    }

    struct Broken;

    impl TextAnalyzer for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn analyze(&self, _content: &str) -> Result<Vec<Finding>, AnalyzerError> {
            Err(AnalyzerError::new("broken", "dictionary missing"))
        }
    }

    fn reviewer(platform: Arc<StubPlatform>, analyzer: Arc<dyn TextAnalyzer>) -> Reviewer {
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            crate::core::handlers::FileMatcher::Suffix(".md".to_string()),
            FilePipeline::new("markdown").with_fast(analyzer),
        );
        Reviewer::new(platform, handlers, KeyPolicy::Exact)
    }

    #[tokio::test]
    async fn only_changed_lines_are_posted() {
        let platform = Arc::new(StubPlatform::default());
        let outcome = reviewer(platform.clone(), Arc::new(FlagEveryLine))
            .review_pull_request("acme/docs", 7)
            .await;

        assert_eq!(outcome, ReviewOutcome::success(ReviewOutcome::POSTED));
        let posted = platform.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].line, 2);
        assert_eq!(posted[0].body, "line 2");
    }

    #[tokio::test]
    async fn existing_comment_suppresses_repost() {
        let platform = Arc::new(StubPlatform {
            existing: vec![ExistingComment {
                commit_id: "head".to_string(),
                diff_hunk: PATCH.to_string(),
                body: "line 2".to_string(),
            }],
            ..StubPlatform::default()
        });
        let outcome = reviewer(platform.clone(), Arc::new(FlagEveryLine))
            .review_pull_request("acme/docs", 7)
            .await;

        assert_eq!(outcome.message, "No issues found");
        assert!(platform.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyzer_error_fails_the_run() {
        let platform = Arc::new(StubPlatform::default());
        let outcome = reviewer(platform.clone(), Arc::new(Broken))
            .review_pull_request("acme/docs", 7)
            .await;

        assert_eq!(outcome.status, ReviewStatus::Failure);
        assert!(outcome.message.starts_with("Exception occurred: "));
        assert!(outcome.message.contains("dictionary missing"));
    }

    #[tokio::test]
    async fn permission_denied_maps_to_post_message() {
        let platform = Arc::new(StubPlatform {
            post_error: Some(|| PostFailure::PermissionDenied {
                detail: "Resource not accessible".to_string(),
            }),
            ..StubPlatform::default()
        });
        let outcome = reviewer(platform, Arc::new(FlagEveryLine))
            .review_pull_request("acme/docs", 7)
            .await;

        assert_eq!(
            outcome,
            ReviewOutcome::failure(
                "Failed to post review comments: Forbidden: You may not have permissions to post a comment."
            )
        );
    }
}
