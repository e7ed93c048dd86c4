use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::EmbeddingConfig;

pub const DIMENSIONS: usize = 768;
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("embedding quota exhausted")]
    RateLimited,
    #[error("embedding service returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected embedding response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Malformed("empty batch response".into()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

/// Gemini `batchEmbedContents`.
pub struct GeminiEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl GeminiEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = format!("models/{}", self.config.model);
        let body = BatchRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: model.clone(),
                    content: Content { parts: vec![Part { text: t }] },
                    output_dimensionality: DIMENSIONS,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/{}:batchEmbedContents", API_BASE, model))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Http {
                status: status.as_u16(),
                body: crate::utils::truncate_chars(&body, 300),
            });
        }

        let parsed: BatchResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedError::Malformed(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        parsed
            .embeddings
            .into_iter()
            .map(|e| {
                if e.values.len() == DIMENSIONS {
                    Ok(e.values)
                } else {
                    Err(EmbedError::Malformed(format!("vector has {} dimensions", e.values.len())))
                }
            })
            .collect()
    }
}
