//! Chat completions.

use super::require;
use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::request::RequestSpec;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Message role in conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parameters of a chat completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Server default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.messages.is_empty() {
            return Err(Error::validation("at least one message is required"));
        }
        if let Some(model) = &self.model {
            require("model", model)?;
        }
        Ok(())
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Total tokens used, computed when the server omits it.
    #[inline]
    pub fn total(&self) -> u32 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }

    /// Merge with another usage, taking max of each field.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.max(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(other.completion_tokens);
        self.total_tokens = self.total_tokens.max(other.total_tokens);
    }
}

/// Reason the completion finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    #[serde(other)]
    Unknown,
}

/// A finished chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub content: String,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub usage: Usage,
}

/// One streamed delta of a chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatChunk {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: String,
    pub finish_reason: Option<FinishReason>,
    /// Usually only present on the last chunk.
    pub usage: Option<Usage>,
}

/// Folds streamed chunks into a [`ChatCompletion`].
#[derive(Debug, Clone, Default)]
pub struct ChatAccumulator {
    id: Option<String>,
    model: Option<String>,
    content: String,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    chunks: usize,
}

impl ChatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate chunk data for the final result.
    pub fn push(&mut self, chunk: &ChatChunk) {
        self.chunks += 1;
        self.content.push_str(&chunk.content);

        if self.id.is_none() {
            self.id.clone_from(&chunk.id);
        }
        if self.model.is_none() {
            self.model.clone_from(&chunk.model);
        }
        // Keep latest/max
        if let Some(usage) = &chunk.usage {
            self.usage.merge(usage);
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
    }

    /// Get current accumulated content.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Get the accumulated completion.
    pub fn finish(self) -> ChatCompletion {
        ChatCompletion {
            id: self.id,
            model: self.model,
            content: self.content,
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

impl Extend<ChatChunk> for ChatAccumulator {
    fn extend<I: IntoIterator<Item = ChatChunk>>(&mut self, iter: I) {
        for chunk in iter {
            self.push(&chunk);
        }
    }
}

/// The `chat` namespace.
pub struct Chat<'a, C> {
    client: &'a C,
}

impl<'a, C: Dispatch> Chat<'a, C> {
    pub(crate) fn new(client: &'a C) -> Self {
        Self { client }
    }

    fn spec(&self, request: &ChatRequest, stream: bool) -> Result<RequestSpec, Error> {
        request.validate()?;
        self.client.prepare(
            RequestSpec::builder(Method::POST, "/chat/completions")
                .json(request)
                .stream(stream),
        )
    }

    /// Create a chat completion.
    pub fn create(&self, request: &ChatRequest) -> C::Call<ChatCompletion> {
        self.client.call(self.spec(request, false))
    }

    /// Create a chat completion delivered as a stream of deltas.
    pub fn create_stream(&self, request: &ChatRequest) -> C::Stream<ChatChunk> {
        self.client.stream(self.spec(request, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::resources::testing;
    use reqwest::header::ACCEPT;
    use serde_json::json;

    #[test]
    fn test_create_request_shape() {
        let (client, recorder) = testing::client(&[(
            200,
            r#"{"id":"c1","content":"Hi there","finish_reason":"stop","usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )]);

        let request = ChatRequest::new(vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hello"),
        ])
        .model("gpt-4")
        .max_tokens(50);
        let completion = client.chat().create(&request).unwrap();

        assert_eq!(completion.content, "Hi there");
        assert_eq!(completion.usage.total(), 5);
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));

        let spec = recorder.last();
        assert_eq!(spec.path(), "/chat/completions");
        assert_eq!(
            spec.body().unwrap(),
            &json!({
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ],
                "model": "gpt-4",
                "max_tokens": 50
            })
        );
    }

    #[test]
    fn test_stream_request_sets_flag() {
        let (client, recorder) = testing::client(&[(
            200,
            "data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\"!\",\"finish_reason\":\"stop\"}\n\ndata: [DONE]\n\n",
        )]);

        let request = ChatRequest::new(vec![ChatMessage::user("Hello")]);
        let mut acc = ChatAccumulator::new();
        for chunk in client.chat().create_stream(&request).unwrap() {
            acc.push(&chunk.unwrap());
        }

        let spec = recorder.last();
        assert_eq!(spec.body().unwrap()["stream"], json!(true));
        assert_eq!(spec.headers()[ACCEPT], "text/event-stream");

        let completion = acc.finish();
        assert_eq!(completion.content, "Hi!");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_empty_messages_rejected_locally() {
        let (client, recorder) = testing::client(&[]);
        let err = client
            .chat()
            .create(&ChatRequest::new(Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn test_accumulator_merges_usage() {
        let mut acc = ChatAccumulator::new();
        acc.extend([
            ChatChunk {
                id: Some("c1".into()),
                content: "Hel".into(),
                ..Default::default()
            },
            ChatChunk {
                content: "lo".into(),
                usage: Some(Usage {
                    prompt_tokens: 4,
                    completion_tokens: 2,
                    total_tokens: 0,
                }),
                ..Default::default()
            },
        ]);

        assert_eq!(acc.content(), "Hello");
        assert_eq!(acc.chunks(), 2);
        let completion = acc.finish();
        assert_eq!(completion.id.as_deref(), Some("c1"));
        assert_eq!(completion.usage.total(), 6);
        assert_eq!(completion.finish_reason, None);
    }

    #[test]
    fn test_unknown_finish_reason() {
        let chunk: ChatChunk =
            serde_json::from_str(r#"{"content":"","finish_reason":"tool_calls"}"#).unwrap();
        assert_eq!(chunk.finish_reason, Some(FinishReason::Unknown));
    }
}
