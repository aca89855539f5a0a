//! The recap/quiz/grading collaborator and its wire format.
//!
//! Two implementations exist: [`openai::OpenAiBackend`] talks to an
//! OpenAI-compatible chat completion API directly, [`http::HttpBackend`]
//! calls a `flashread serve` instance (or anything speaking the same
//! `POST /generate` and `POST /grade` shapes).

pub mod http;
pub mod openai;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::BackendError;

pub use http::HttpBackend;
pub use openai::{OpenAiBackend, OpenAiConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "yesno")]
    YesNo,
    #[serde(rename = "text")]
    FreeText,
}

/// One generated quiz question. Order of generation is quiz order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "question")]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
}

impl Question {
    pub fn yes_no(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: QuestionKind::YesNo,
        }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: QuestionKind::FreeText,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPair {
    pub question: String,
    pub user_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub questions: Vec<AnswerPair>,
    pub original_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    pub graded_answers: Vec<GradedAnswer>,
}

/// Produces recaps and quizzes, and grades answers.
#[async_trait]
pub trait StudyBackend: Send + Sync {
    async fn generate(&self, text: &str) -> Result<GenerateResponse, BackendError>;
    async fn grade(&self, request: &GradeRequest) -> Result<GradeResponse, BackendError>;
}

/// Drops one surrounding Markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a JSON array out of model output. Anything malformed becomes empty.
pub fn parse_list<T: DeserializeOwned>(raw: &str) -> Vec<T> {
    match serde_json::from_str(strip_code_fence(raw)) {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(error = %err, "discarding malformed list from model output");
            Vec::new()
        }
    }
}

pub fn parse_questions(raw: &str) -> Vec<Question> {
    parse_list(raw)
}

pub fn parse_graded(raw: &str) -> Vec<GradedAnswer> {
    parse_list(raw)
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => parse_list(&raw),
        other => serde_json::from_value(other).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "discarding malformed list in response");
            Vec::new()
        }),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
