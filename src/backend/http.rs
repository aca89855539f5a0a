use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{GenerateRequest, GenerateResponse, GradeRequest, GradeResponse, StudyBackend};
use crate::error::BackendError;

/// Calls a remote server exposing `POST /generate` and `POST /grade`.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        tracing::debug!(%url, "posting to backend");
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl StudyBackend for HttpBackend {
    async fn generate(&self, text: &str) -> Result<GenerateResponse, BackendError> {
        let request = GenerateRequest {
            text: text.to_string(),
        };
        self.post("generate", &request).await
    }

    async fn grade(&self, request: &GradeRequest) -> Result<GradeResponse, BackendError> {
        self.post("grade", request).await
    }
}
