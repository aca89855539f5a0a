use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    parse_graded, parse_questions, GenerateResponse, GradeRequest, GradeResponse, StudyBackend,
};
use crate::error::BackendError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Number of flashcard questions requested per text.
const QUESTION_COUNT: usize = 3;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiConfig {
    /// Reads the key from `FLASHREAD_AI_API_KEY` (or `OPENAI_API_KEY`);
    /// base url and model fall back to the given defaults.
    #[must_use]
    pub fn from_env(default_base_url: &str, default_model: &str) -> Option<Self> {
        let api_key = env::var("FLASHREAD_AI_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url =
            env::var("FLASHREAD_AI_BASE_URL").unwrap_or_else(|_| default_base_url.into());
        let model = env::var("FLASHREAD_AI_MODEL").unwrap_or_else(|_| default_model.into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Talks to an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    config: Option<OpenAiConfig>,
}

impl OpenAiBackend {
    #[must_use]
    pub fn new(config: Option<OpenAiConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Sends a single user message and returns the reply text.
    ///
    /// A reply without content is returned as an empty string.
    async fn complete(&self, prompt: String) -> Result<String, BackendError> {
        let config = self.config.as_ref().ok_or(BackendError::Disabled)?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

pub fn summary_prompt(text: &str) -> String {
    format!("Summarize the following text in 3-4 sentences in the same language:\n\n{text}")
}

pub fn questions_prompt(text: &str) -> String {
    format!(
        "Create {QUESTION_COUNT} flashcard questions from the following text \
         in the same language as the text. \
         Respond in JSON format like this:\n\
         [\n  {{ \"question\": \"Is the sky blue?\", \"type\": \"yesno\" }},\n  \
         {{ \"question\": \"What is the main idea?\", \"type\": \"text\" }}\n]\n\
         Text:\n\n{text}"
    )
}

pub fn grading_prompt(request: &GradeRequest) -> Result<String, BackendError> {
    let answers = serde_json::to_string_pretty(&request.questions)?;
    Ok(format!(
        "\nBased on the following text:\n\n\"{}\"\n\n\
         Grade the user's answers as true or false. Respond with JSON in this format:\n\
         [\n  {{ \"question\": \"...\", \"answer\": \"...\", \"correct\": true }}\n]\n\n\
         Questions and user answers:\n{}\n",
        request.original_text, answers
    ))
}

#[async_trait]
impl StudyBackend for OpenAiBackend {
    async fn generate(&self, text: &str) -> Result<GenerateResponse, BackendError> {
        let (summary, questions) = tokio::join!(
            self.complete(summary_prompt(text)),
            self.complete(questions_prompt(text)),
        );
        let summary = summary?;
        let questions = parse_questions(&questions?);
        tracing::info!(questions = questions.len(), "generated recap and quiz");
        Ok(GenerateResponse { summary, questions })
    }

    async fn grade(&self, request: &GradeRequest) -> Result<GradeResponse, BackendError> {
        let raw = self.complete(grading_prompt(request)?).await?;
        let graded_answers = parse_graded(&raw);
        tracing::info!(graded = graded_answers.len(), "graded answers");
        Ok(GradeResponse { graded_answers })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
