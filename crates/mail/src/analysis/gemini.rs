//! Gemini REST implementation of `Analyst`

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

use super::{AnalysisInput, Analyst};
use crate::models::AiAnalysis;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Analyst backed by the Gemini `generateContent` endpoint
pub struct GeminiAnalyst {
    agent: ureq::Agent,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// One element of the batch response array
#[derive(Deserialize)]
struct BatchItem {
    id: String,
    #[serde(flatten)]
    analysis: AiAnalysis,
}

impl GeminiAnalyst {
    pub fn new(agent: ureq::Agent, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            agent,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build from the `GEMINI_API_KEY` environment variable
    pub fn from_env(agent: ureq::Agent, model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;
        if api_key.trim().is_empty() {
            anyhow::bail!("GEMINI_API_KEY is empty");
        }
        Ok(Self::new(agent, api_key, model))
    }

    fn generate(&self, body: &Value) -> Result<Option<String>> {
        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let mut response = self
            .agent
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .send_json(body)
            .context("Gemini request failed")?;

        let parsed: GenerateResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse Gemini response")?;
        Ok(parsed.text())
    }
}

fn batch_prompt(inputs: &[AnalysisInput]) -> Result<String> {
    let data = serde_json::to_string(inputs)?;
    Ok(format!(
        "You are an expert executive assistant. Analyze the following emails.\n\
         For each email, provide:\n\
         1. A concise summary (max 2 sentences).\n\
         2. A priority level (HIGH, MEDIUM, LOW) based on urgency and sender importance.\n\
         3. An urgency score (0-100).\n\
         4. A category (WORK, PERSONAL, NEWSLETTER, FINANCE, SPAM_LIKELY).\n\
         5. A list of suggested action items (if any).\n\
         6. Sentiment (POSITIVE, NEUTRAL, NEGATIVE).\n\n\
         Input Data:\n{}",
        data
    ))
}

fn batch_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": { "type": "STRING" },
                "summary": { "type": "STRING" },
                "priority": { "type": "STRING", "enum": ["HIGH", "MEDIUM", "LOW"] },
                "urgencyScore": { "type": "INTEGER" },
                "category": {
                    "type": "STRING",
                    "enum": ["WORK", "PERSONAL", "NEWSLETTER", "FINANCE", "SPAM_LIKELY"]
                },
                "actionItems": { "type": "ARRAY", "items": { "type": "STRING" } },
                "sentiment": { "type": "STRING", "enum": ["POSITIVE", "NEUTRAL", "NEGATIVE"] }
            },
            "required": [
                "id", "summary", "priority", "urgencyScore",
                "category", "actionItems", "sentiment"
            ]
        }
    })
}

fn reply_prompt(input: &AnalysisInput) -> String {
    format!(
        "Draft a professional and context-aware reply to this email.\n\
         Sender: {}\n\
         Subject: {}\n\
         Body: \"{}\"\n\n\
         The reply should be concise, polite, and directly address the points in the email.\n\
         If it's urgent, acknowledge the urgency.\n\
         Do not include placeholders like \"[Your Name]\", just sign off as \"AI Assistant\".",
        input.sender_name, input.subject, input.body
    )
}

/// Parse the model's JSON array into a map keyed by message id
fn parse_batch(text: &str) -> Result<HashMap<String, AiAnalysis>> {
    let items: Vec<BatchItem> =
        serde_json::from_str(text).context("Model returned malformed analysis JSON")?;
    Ok(items.into_iter().map(|i| (i.id, i.analysis)).collect())
}

impl Analyst for GeminiAnalyst {
    fn analyze_batch(&self, inputs: &[AnalysisInput]) -> Result<HashMap<String, AiAnalysis>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": batch_prompt(inputs)? }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": batch_schema()
            }
        });

        let text = self
            .generate(&body)?
            .context("No data returned from AI")?;
        parse_batch(&text)
    }

    fn draft_reply(&self, input: &AnalysisInput) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": reply_prompt(input) }] }]
        });
        Ok(self.generate(&body)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Priority};

    fn input() -> AnalysisInput {
        AnalysisInput {
            id: "m1".into(),
            sender: "boss@corp.com".into(),
            sender_name: "Boss".into(),
            subject: "Board meeting".into(),
            body: "Moved to tomorrow".into(),
        }
    }

    #[test]
    fn test_parse_batch() {
        let text = r#"[
            {"id": "m1", "summary": "Meeting moved.", "priority": "HIGH", "urgencyScore": 130,
             "category": "WORK", "actionItems": ["Update slides"], "sentiment": "NEUTRAL"},
            {"id": "m2", "summary": "Sale!", "priority": "LOW", "urgencyScore": 5,
             "category": "NEWSLETTER", "actionItems": [], "sentiment": "POSITIVE"}
        ]"#;

        let map = parse_batch(text).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["m1"].priority, Priority::High);
        assert_eq!(map["m1"].urgency_score, 100);
        assert_eq!(map["m2"].category, Category::Newsletter);
    }

    #[test]
    fn test_parse_batch_rejects_garbage() {
        assert!(parse_batch("Sure! Here is the analysis").is_err());
    }

    #[test]
    fn test_batch_prompt_omits_sender_name() {
        let prompt = batch_prompt(&[input()]).unwrap();
        assert!(prompt.contains(r#""id":"m1""#));
        assert!(prompt.contains("boss@corp.com"));
        assert!(!prompt.contains("sender_name"));
    }

    #[test]
    fn test_reply_prompt() {
        let prompt = reply_prompt(&input());
        assert!(prompt.contains("Sender: Boss"));
        assert!(prompt.contains("Body: \"Moved to tomorrow\""));
    }

    #[test]
    fn test_response_text() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"there"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello there"));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }
}
