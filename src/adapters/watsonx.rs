use crate::adapters::llm::{LLMAdapter, LLMRequest, LLMResponse, ModelConfig, Usage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const IBM_IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const DEFAULT_GENERATION_URL: &str =
    "https://us-south.ml.cloud.ibm.com/ml/v1/text/generation?version=2023-05-29";

/// IBM watsonx.ai text generation. Each call exchanges the API key for a
/// short-lived IAM bearer token first.
pub struct WatsonxAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    project_id: String,
    generation_url: String,
    iam_url: String,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    input: String,
    parameters: Parameters,
    model_id: &'a str,
    project_id: &'a str,
}

#[derive(Serialize)]
struct Parameters {
    decoding_method: &'static str,
    max_new_tokens: usize,
    temperature: f32,
    repetition_penalty: f32,
}

#[derive(Deserialize)]
struct GenerationResponse {
    model_id: String,
    results: Vec<GenerationResult>,
}

#[derive(Deserialize)]
struct GenerationResult {
    generated_text: String,
    #[serde(default)]
    input_token_count: usize,
    #[serde(default)]
    generated_token_count: usize,
}

#[derive(Deserialize)]
struct IamToken {
    access_token: String,
}

impl WatsonxAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("WATSONX_APIKEY").ok())
            .context("watsonx API key not found. Set WATSONX_APIKEY or llm.api_key")?;
        let project_id = config
            .project_id
            .clone()
            .or_else(|| std::env::var("WATSONX_PROJECT_ID").ok())
            .context("watsonx project id not found. Set WATSONX_PROJECT_ID or llm.project_id")?;
        let generation_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_GENERATION_URL.to_string());

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
            project_id,
            generation_url,
            iam_url: IBM_IAM_TOKEN_URL.to_string(),
        })
    }

    pub fn with_iam_url(mut self, iam_url: impl Into<String>) -> Self {
        self.iam_url = iam_url.into();
        self
    }

    async fn bearer_token(&self) -> Result<String> {
        let response = self
            .client
            .post(&self.iam_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach IBM Cloud IAM")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Unable to obtain bearer token from IBM Cloud ({}): {}", status, body);
        }

        let token: IamToken = response
            .json()
            .await
            .context("Failed to parse IBM Cloud IAM response")?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl LLMAdapter for WatsonxAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        let token = self.bearer_token().await?;

        let body = GenerationRequest {
            input: format!("{}\n\n{}", request.system_prompt, request.user_prompt),
            parameters: Parameters {
                decoding_method: "greedy",
                max_new_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
                temperature: request.temperature.unwrap_or(self.config.temperature),
                repetition_penalty: 1.0,
            },
            model_id: &self.config.model_name,
            project_id: &self.project_id,
        };

        let response = self
            .client
            .post(&self.generation_url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to watsonx")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("watsonx API error ({}): {}", status, error_text);
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .context("Failed to parse watsonx response")?;

        let first = parsed.results.into_iter().next();
        let usage = first.as_ref().map(|r| Usage {
            prompt_tokens: r.input_token_count,
            completion_tokens: r.generated_token_count,
            total_tokens: r.input_token_count + r.generated_token_count,
        });

        Ok(LLMResponse {
            content: first.map(|r| r.generated_text).unwrap_or_default(),
            model: parsed.model_id,
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
