//! Chat-completion client used to answer questions.
//!
//! The OpenAI-backed client issues HTTP requests directly with `reqwest`. Every call carries a
//! timeout: non-streaming calls are cancelled when the timeout elapses, and streaming calls stop
//! with a [`CompletionError::Timeout`] item once the stream has been open for that long.

mod sse;

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use sse::{SseDecoder, SseEvent};

const MAX_TOKENS: u32 = 1000;
const ASK_TEMPERATURE: f32 = 0.0;
const CHAT_TEMPERATURE: f32 = 0.7;

/// Stream of content fragments produced by [`CompletionClient::stream`].
pub type CompletionStream = BoxStream<'static, Result<String, CompletionError>>;

/// Errors surfaced by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Caller supplied an unusable prompt.
    #[error("{0}")]
    InvalidPrompt(String),
    /// Provider answered without any content.
    #[error("Empty response from LLM")]
    EmptyResponse,
    /// Provider did not answer within the allotted time.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    /// Transport failure or error status from the provider.
    #[error("LLM API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(error: reqwest::Error) -> Self {
        Self::Api(error.to_string())
    }
}

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier reported to API consumers.
    fn model(&self) -> &str;

    /// Answer a single user prompt deterministically.
    async fn ask(&self, prompt: &str, timeout: Option<Duration>) -> Result<String, CompletionError>;

    /// Answer a user prompt under a system instruction.
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, CompletionError>;

    /// Stream the answer to a prompt fragment by fragment.
    async fn stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CompletionStream, CompletionError>;
}

/// Completion client for the OpenAI `/v1/chat/completions` endpoint.
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl OpenAiCompletionClient {
    /// Construct a client with default timeouts for regular and streaming calls.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
        stream_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent("pdf-rag/completion")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout,
            stream_timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage<'_>>,
        temperature: f32,
        timeout: Option<Duration>,
    ) -> Result<String, CompletionError> {
        let timeout = timeout.unwrap_or(self.request_timeout);
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response = match tokio::time::timeout(timeout, self.send(&body)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "Completion request timed out");
                return Err(CompletionError::Timeout(timeout.as_secs()));
            }
        };

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, CompletionError> {
        let response = self.post(body).await?;
        Ok(response.json().await?)
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, CompletionError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Completion provider returned an error");
            return Err(CompletionError::Api(format!("{status}: {text}")));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> ChatMessage<'a> {
    fn system(content: &'a str) -> Self {
        Self {
            role: "system",
            content,
        }
    }

    fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn require(value: &str, message: &str) -> Result<(), CompletionError> {
    if value.trim().is_empty() {
        Err(CompletionError::InvalidPrompt(message.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn ask(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, CompletionError> {
        require(prompt, "Prompt cannot be empty")?;
        self.complete(vec![ChatMessage::user(prompt)], ASK_TEMPERATURE, timeout)
            .await
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, CompletionError> {
        require(system_prompt, "System prompt cannot be empty")?;
        require(user_prompt, "User prompt cannot be empty")?;
        self.complete(
            vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            CHAT_TEMPERATURE,
            timeout,
        )
        .await
    }

    async fn stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CompletionStream, CompletionError> {
        require(prompt, "Prompt cannot be empty")?;
        let timeout = timeout.unwrap_or(self.stream_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let timeout_secs = timeout.as_secs();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: CHAT_TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: true,
        };

        let response = match tokio::time::timeout_at(deadline, self.post(&body)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(timeout_secs, "Stream timed out before the first byte");
                return Err(CompletionError::Timeout(timeout_secs));
            }
        };

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut finished = false;
            while !finished {
                let next = match tokio::time::timeout_at(deadline, bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::error!(timeout_secs, "Stream timed out");
                        yield Err(CompletionError::Timeout(timeout_secs));
                        break;
                    }
                };
                let chunk = match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => {
                        yield Err(CompletionError::from(err));
                        break;
                    }
                    None => break,
                };
                match decoder.feed(&chunk) {
                    Ok(events) => {
                        for event in events {
                            match event {
                                SseEvent::Delta(content) => yield Ok(content),
                                SseEvent::Done => finished = true,
                            }
                        }
                    }
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}
