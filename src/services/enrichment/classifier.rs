//! OpenAI-compatible chat client that tags artworks against the closed
//! vocabularies.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::models::vocab::{self, canonical};

/// Hard ceiling on one classification call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(120);
const MIN_TAGS: usize = 5;
const MAX_TAGS: usize = 15;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("classifier returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("unusable classifier response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyItem {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub shopify_product_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub style: Option<String>,
    pub mood: Option<String>,
    pub subject: Option<String>,
    pub era: Option<String>,
    pub palette: Option<String>,
    pub ai_tags: Vec<String>,
}

impl Classification {
    /// Tags pushed to the storefront: the free-form keywords plus the
    /// vocabulary answers.
    pub fn storefront_tags(&self) -> Vec<String> {
        let mut tags = self.ai_tags.clone();
        for extra in [&self.style, &self.mood, &self.era].into_iter().flatten() {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(extra)) {
                tags.push(extra.clone());
            }
        }
        tags
    }
}

/// The answer for one item. `Err` says why the answer could not be used.
pub type ItemResult = Result<Classification, String>;

#[async_trait]
pub trait Classifier: Send + Sync {
    /// One result per item, in item order.
    async fn classify(&self, items: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError>;
}

#[derive(Debug, Default, Deserialize)]
struct RawClassification {
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    era: Option<String>,
    #[serde(default)]
    palette: Option<String>,
    #[serde(default)]
    ai_tags: Vec<Value>,
}

fn clean_tags(raw: Vec<Value>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.iter().filter_map(Value::as_str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(MAX_TAGS);
    tags
}

impl From<RawClassification> for Classification {
    fn from(raw: RawClassification) -> Self {
        let pick = |vocab: &[&'static str], v: Option<String>| {
            v.and_then(|v| canonical(vocab, &v)).map(str::to_string)
        };
        let ai_tags = clean_tags(raw.ai_tags);
        if ai_tags.len() < MIN_TAGS {
            tracing::debug!("Classifier | Only {} tags returned", ai_tags.len());
        }
        Self {
            style: pick(vocab::STYLES, raw.style),
            mood: pick(vocab::MOODS, raw.mood),
            subject: pick(vocab::SUBJECTS, raw.subject),
            era: pick(vocab::ERAS, raw.era),
            palette: pick(vocab::PALETTES, raw.palette),
            ai_tags,
        }
    }
}

/// Accepts a bare array, an object wrapping it under `results`, `artworks`
/// or `classifications`, or an object whose only array field is the list.
/// Elements that are not classification objects, or carry no style from the
/// vocabulary, come back as item errors.
pub fn parse_classifications(content: &str) -> Result<Vec<ItemResult>, ClassifierError> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| ClassifierError::Malformed(format!("not JSON: {e}")))?;

    let list = match value {
        Value::Array(list) => list,
        Value::Object(mut map) => {
            let wrapped = ["results", "artworks", "classifications"]
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(list)) => Some(list),
                    _ => None,
                });
            match wrapped {
                Some(list) => list,
                None => {
                    let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                        Value::Array(list) => Some(list),
                        _ => None,
                    });
                    match (arrays.next(), arrays.next()) {
                        (Some(list), None) => list,
                        _ => return Err(ClassifierError::Malformed("no single array field".into())),
                    }
                }
            }
        }
        _ => return Err(ClassifierError::Malformed("expected an array or object".into())),
    };

    Ok(list.into_iter().map(parse_item).collect())
}

fn parse_item(value: Value) -> ItemResult {
    let raw: RawClassification =
        serde_json::from_value(value).map_err(|e| format!("unusable classification: {e}"))?;
    let answered = raw.style.clone();
    let classification = Classification::from(raw);
    if classification.style.is_some() {
        return Ok(classification);
    }
    Err(match answered {
        Some(style) => format!("style {style:?} is not in the vocabulary"),
        None => "classification has no style".to_string(),
    })
}

fn system_prompt() -> String {
    format!(
        "You classify artworks for a fine-art print store. For each numbered artwork return one \
         object with the keys style, mood, subject, era, palette and ai_tags. \
         style must be one of: {}. mood must be one of: {}. subject must be one of: {}. \
         era must be one of: {}. palette must be one of: {}. \
         ai_tags is a list of 5 to 15 descriptive SEO keywords; include the country and continent \
         the work depicts or comes from when known. \
         Respond with JSON only: {{\"results\": [ ... ]}} with one object per artwork in the original order.",
        vocab::STYLES.join(", "),
        vocab::MOODS.join(", "),
        vocab::SUBJECTS.join(", "),
        vocab::ERAS.join(", "),
        vocab::PALETTES.join(", "),
    )
}

pub fn user_prompt(items: &[ClassifyItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}:\"{}\" by {}", i + 1, item.title, item.artist))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

pub struct LlmClassifier {
    client: Client,
    config: LlmConfig,
}

impl LlmClassifier {
    pub fn new(config: LlmConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(CALL_TIMEOUT).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, items: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt() },
                ChatMessage { role: "user", content: user_prompt(items) },
            ],
            temperature: 0.2,
            response_format: ResponseFormat { format_type: "json_object" },
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                body: crate::utils::truncate_chars(&body, 300),
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::Malformed("empty completion".into()))?;

        let parsed = parse_classifications(&content)?;
        if parsed.len() != items.len() {
            tracing::warn!(
                "Classifier | Asked for {} classifications, got {}",
                items.len(),
                parsed.len()
            );
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"{"style":"impressionism","mood":"Serene","subject":"Landscape","era":"19th Century","palette":"Cool","ai_tags":["Water Lilies","pond","France","Europe","garden","garden"]}"#;

    #[test]
    fn bare_array() {
        let parsed = parse_classifications(&format!("[{ONE}]")).unwrap();
        assert_eq!(parsed.len(), 1);
        let first = parsed[0].as_ref().unwrap();
        assert_eq!(first.style.as_deref(), Some("Impressionism"));
        assert_eq!(first.ai_tags, vec!["water lilies", "pond", "france", "europe", "garden"]);
    }

    #[test]
    fn known_wrappers() {
        for key in ["results", "artworks", "classifications"] {
            let parsed = parse_classifications(&format!("{{\"{key}\": [{ONE}, {ONE}]}}")).unwrap();
            assert_eq!(parsed.len(), 2, "wrapper {key}");
        }
    }

    #[test]
    fn sole_array_field() {
        let parsed = parse_classifications(&format!("{{\"count\": 1, \"items\": [{ONE}]}}")).unwrap();
        assert_eq!(parsed[0].as_ref().unwrap().mood.as_deref(), Some("Serene"));
    }

    #[test]
    fn ambiguous_or_broken_payloads_fail() {
        assert!(parse_classifications("{\"a\": [], \"b\": []}").is_err());
        assert!(parse_classifications("\"just text\"").is_err());
        assert!(parse_classifications("not json").is_err());
    }

    #[test]
    fn off_vocabulary_answers_are_dropped() {
        let parsed = parse_classifications(r#"[{"style":"Realism","mood":"Vaporwave","era":"serene"}]"#).unwrap();
        let first = parsed[0].as_ref().unwrap();
        assert_eq!(first.style.as_deref(), Some("Realism"));
        assert_eq!(first.mood, None);
        assert_eq!(first.era, None);
        assert!(first.ai_tags.is_empty());
    }

    #[test]
    fn unusable_elements_are_item_errors() {
        let parsed = parse_classifications(
            r#"[{"style":"Realism"}, "garbage", 7, {"colour":"red"}, {"style":"Vaporwave","mood":"serene"}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 5);
        assert!(parsed[0].is_ok());
        assert!(parsed[1..].iter().all(Result::is_err));
        assert_eq!(parsed[3], Err("classification has no style".to_string()));
        assert_eq!(parsed[4], Err("style \"Vaporwave\" is not in the vocabulary".to_string()));
    }

    #[test]
    fn prompt_numbers_items() {
        let items = vec![
            ClassifyItem { id: Uuid::nil(), title: "Sunrise".into(), artist: "Monet".into(), shopify_product_id: None },
            ClassifyItem { id: Uuid::nil(), title: "Scream".into(), artist: "Munch".into(), shopify_product_id: None },
        ];
        assert_eq!(user_prompt(&items), "1:\"Sunrise\" by Monet\n2:\"Scream\" by Munch");
    }

    #[test]
    fn storefront_tags_append_vocabulary_without_duplicates() {
        let c = Classification {
            style: Some("Realism".into()),
            mood: Some("Dark".into()),
            era: None,
            ai_tags: vec!["realism".into(), "night".into()],
            ..Default::default()
        };
        assert_eq!(c.storefront_tags(), vec!["realism", "night", "Dark"]);
    }
}
