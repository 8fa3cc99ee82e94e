use crate::config::GithubConfig;
use crate::core::ReviewComment;
use crate::errors::{PlatformError, PostFailure};
use crate::platform::{ChangedFile, ExistingComment, Page, PlatformClient, PullRequest, Repository};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

const USER_AGENT: &str = "reviewbot";
const ACCEPT: &str = "application/vnd.github+json";
const PER_PAGE: u32 = 30;
const REVIEW_BODY: &str = "Automated code review comments.";

/// Installation tokens are refreshed this long before GitHub expires them.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub enum GitHubAuth {
    Token(String),
    App {
        app_id: String,
        installation_id: String,
        private_key: String,
    },
}

impl GitHubAuth {
    /// Prefers GitHub App credentials when all three parts are configured.
    pub fn from_config(config: &GithubConfig) -> Result<Self, PlatformError> {
        match (&config.app_id, &config.installation_id, &config.private_key) {
            (Some(app_id), Some(installation_id), Some(private_key)) => Ok(GitHubAuth::App {
                app_id: app_id.clone(),
                installation_id: installation_id.clone(),
                private_key: private_key.clone(),
            }),
            _ => config
                .token
                .clone()
                .map(GitHubAuth::Token)
                .ok_or_else(|| {
                    PlatformError::Auth(
                        "no GitHub credentials configured; set GITHUB_TOKEN or GitHub App settings"
                            .to_string(),
                    )
                }),
        }
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AppClaims {
    /// Backdated a minute to tolerate clock drift; GitHub caps lifetime at ten.
    fn at(now: DateTime<Utc>, app_id: &str) -> Self {
        Self {
            iat: (now - Duration::seconds(60)).timestamp(),
            exp: (now + Duration::minutes(10)).timestamp(),
            iss: app_id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    head: HeadPayload,
    #[serde(default)]
    labels: Vec<LabelPayload>,
    #[serde(default)]
    changed_files: usize,
    #[serde(default)]
    review_comments: usize,
}

#[derive(Deserialize)]
struct HeadPayload {
    sha: String,
}

#[derive(Deserialize)]
struct LabelPayload {
    name: String,
}

#[derive(Deserialize)]
struct ContentPayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct ReviewPayload {
    id: Option<u64>,
}

/// GitHub REST v3 client.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    auth: GitHubAuth,
    installation_token: Mutex<Option<CachedToken>>,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, auth: GitHubAuth) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PlatformError::Auth(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth,
            installation_token: Mutex::new(None),
        })
    }

    pub fn from_config(config: &GithubConfig) -> Result<Self, PlatformError> {
        Self::new(config.api_url.clone(), GitHubAuth::from_config(config)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn token(&self) -> Result<String, PlatformError> {
        match &self.auth {
            GitHubAuth::Token(token) => Ok(token.clone()),
            GitHubAuth::App {
                app_id,
                installation_id,
                private_key,
            } => {
                let mut cached = self.installation_token.lock().await;
                if let Some(token) = cached.as_ref() {
                    if token.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
                        return Ok(token.token.clone());
                    }
                }

                let fresh = self
                    .create_installation_token(app_id, installation_id, private_key)
                    .await?;
                let token = fresh.token.clone();
                *cached = Some(fresh);
                Ok(token)
            }
        }
    }

    async fn create_installation_token(
        &self,
        app_id: &str,
        installation_id: &str,
        private_key: &str,
    ) -> Result<CachedToken, PlatformError> {
        let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
            .map_err(|e| PlatformError::Auth(format!("invalid GitHub App private key: {}", e)))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &AppClaims::at(Utc::now(), app_id), &key)
            .map_err(|e| PlatformError::Auth(format!("failed to encode JWT: {}", e)))?;

        let response = self
            .client
            .post(self.url(&format!("app/installations/{}/access_tokens", installation_id)))
            .bearer_auth(jwt)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| PlatformError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Auth(format!(
                "failed to create installation token ({}): {}",
                status, body
            )));
        }

        let token: InstallationToken = response
            .json()
            .await
            .map_err(|e| PlatformError::Auth(e.to_string()))?;
        tracing::info!(installation_id, expires_at = %token.expires_at, "Obtained GitHub App installation token");
        Ok(CachedToken {
            token: token.token,
            expires_at: token.expires_at,
        })
    }

    async fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, PlatformError> {
        Ok(request
            .bearer_auth(self.token().await?)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        resource: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let request = self.authed(self.client.get(self.url(path)).query(query)).await?;
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::fetch(resource, e))?;
        let response = ensure_success(resource, response).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::fetch(resource, e))
    }
}

async fn ensure_success(resource: &str, response: Response) -> Result<Response, PlatformError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::fetch(resource, format!("HTTP {}: {}", status, body)))
}

fn post_failure(status: StatusCode, detail: String) -> PostFailure {
    match status {
        StatusCode::FORBIDDEN => PostFailure::PermissionDenied { detail },
        StatusCode::UNPROCESSABLE_ENTITY => PostFailure::ValidationFailed { detail },
        _ => PostFailure::Unknown(format!("HTTP {}: {}", status, detail)),
    }
}

#[async_trait]
impl PlatformClient for GitHubClient {
    async fn get_pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PlatformError> {
        let resource = format!("pull request {}#{}", repo, number);
        let payload: PullRequestPayload = self
            .get_json(&resource, &format!("repos/{}/pulls/{}", repo, number), &[])
            .await?;

        Ok(PullRequest {
            repo: repo.to_string(),
            number,
            head_sha: payload.head.sha,
            labels: payload.labels.into_iter().map(|l| l.name).collect(),
            changed_files: payload.changed_files,
            review_comments: payload.review_comments,
        })
    }

    async fn get_repository(&self, repo: &str) -> Result<Repository, PlatformError> {
        self.get_json(&format!("repository {}", repo), &format!("repos/{}", repo), &[])
            .await
    }

    async fn get_file_content(
        &self,
        repo: &Repository,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, PlatformError> {
        let resource = format!("{} at {}", path, git_ref);
        let payload: ContentPayload = self
            .get_json(
                &resource,
                &format!("repos/{}/contents/{}", repo.full_name, path),
                &[("ref", git_ref.to_string())],
            )
            .await?;

        if payload.encoding != "base64" {
            return Err(PlatformError::fetch(
                resource,
                format!("unsupported content encoding '{}'", payload.encoding),
            ));
        }

        let compact: String = payload.content.split_whitespace().collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| PlatformError::fetch(resource, e))
    }

    async fn list_changed_files(
        &self,
        pr: &PullRequest,
        page: u32,
    ) -> Result<Page<ChangedFile>, PlatformError> {
        let items: Vec<ChangedFile> = self
            .get_json(
                &format!("changed files of {}#{}", pr.repo, pr.number),
                &format!("repos/{}/pulls/{}/files", pr.repo, pr.number),
                &[("page", page.to_string()), ("per_page", PER_PAGE.to_string())],
            )
            .await?;
        Ok(Page {
            items,
            total_count: pr.changed_files,
        })
    }

    async fn list_review_comments(
        &self,
        pr: &PullRequest,
        page: u32,
    ) -> Result<Page<ExistingComment>, PlatformError> {
        let items: Vec<ExistingComment> = self
            .get_json(
                &format!("review comments of {}#{}", pr.repo, pr.number),
                &format!("repos/{}/pulls/{}/comments", pr.repo, pr.number),
                &[("page", page.to_string()), ("per_page", PER_PAGE.to_string())],
            )
            .await?;
        Ok(Page {
            items,
            total_count: pr.review_comments,
        })
    }

    async fn post_review_comments(
        &self,
        repo: &str,
        number: u64,
        comments: &[ReviewComment],
    ) -> Result<(), PlatformError> {
        let pr = self.get_pull_request(repo, number).await?;
        let body = json!({
            "commit_id": pr.head_sha,
            "body": REVIEW_BODY,
            "event": "COMMENT",
            "comments": comments,
        });

        let request = self
            .authed(self.client.post(self.url(&format!("repos/{}/pulls/{}/reviews", repo, number))))
            .await?;
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| PostFailure::Unknown(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(repo, pr = number, %status, %detail, "GitHub rejected review");
            return Err(post_failure(status, detail).into());
        }

        let review: ReviewPayload = response
            .json()
            .await
            .map_err(|e| PostFailure::Unknown(e.to_string()))?;
        match review.id {
            Some(id) => {
                tracing::info!(repo, pr = number, review_id = id, count = comments.len(), "Created review");
                Ok(())
            }
            None => Err(PostFailure::Unknown("response did not include a review id".to_string()).into()),
        }
    }
}
