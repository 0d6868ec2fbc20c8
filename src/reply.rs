//! Structured chat replies
//!
//! The language model answers every turn with a JSON object carrying the text to
//! speak, an optional fact to remember, and whether the conversation continues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::ChatMessage;
use crate::{Error, Result};

/// One structured reply from the language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyResult {
    /// Text to speak back to the user
    pub speak: String,

    /// Fact to remember (empty when there is nothing worth keeping)
    #[serde(default)]
    pub memory: String,

    /// Whether to keep listening after speaking
    #[serde(rename = "continueConversation")]
    pub continue_conversation: bool,
}

impl ReplyResult {
    /// Parse the model's message content
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedReply`] if the content is not a conforming JSON object
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content.trim())
            .map_err(|e| Error::MalformedReply(format!("{e}: {content}")))
    }
}

/// Produces a structured reply for a message history
#[async_trait]
pub trait ReplyClient: Send + Sync {
    /// Request a reply for `messages`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reply`] on network or status failure, [`Error::MalformedReply`]
    /// when the payload does not match the reply schema
    async fn reply(&self, messages: &[ChatMessage]) -> Result<ReplyResult>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions against the `OpenAI` API with a strict JSON schema
pub struct OpenAiReplyClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiReplyClient {
    /// Create a new reply client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "assistant_response",
                    "schema": {
                        "type": "object",
                        "properties": {
                            "speak": { "type": "string" },
                            "memory": { "type": "string" },
                            "continueConversation": { "type": "boolean" }
                        },
                        "required": ["speak", "memory", "continueConversation"],
                        "additionalProperties": false
                    },
                    "strict": true
                }
            }
        })
    }
}

#[async_trait]
impl ReplyClient for OpenAiReplyClient {
    async fn reply(&self, messages: &[ChatMessage]) -> Result<ReplyResult> {
        tracing::debug!(messages = messages.len(), model = %self.model, "requesting reply");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                Error::Reply(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Reply(format!("chat API error {status}: {body}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedReply(format!("unreadable completion: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::MalformedReply("no choices returned from API".to_string()))?;

        tracing::debug!(content = %content, "model replied");
        ReplyResult::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schema_conforming_reply() {
        let reply = ReplyResult::parse(
            r#"{"speak":"Sure, I'll remember that.","memory":"call mom","continueConversation":true}"#,
        )
        .unwrap();

        assert_eq!(reply.speak, "Sure, I'll remember that.");
        assert_eq!(reply.memory, "call mom");
        assert!(reply.continue_conversation);
    }

    #[test]
    fn rejects_invalid_json() {
        let err = ReplyResult::parse("Sure! {not json").unwrap_err();
        assert!(matches!(err, Error::MalformedReply(_)));
    }

    #[test]
    fn rejects_missing_continue_flag() {
        let err = ReplyResult::parse(r#"{"speak":"hi","memory":""}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedReply(_)));
    }

    #[test]
    fn request_uses_strict_schema() {
        let client = OpenAiReplyClient::new(
            "sk-test".to_string(),
            "https://api.openai.com/v1/".to_string(),
            "gpt-4o-mini".to_string(),
        )
        .unwrap();

        let body = client.request_body(&[ChatMessage::system("hello")]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = OpenAiReplyClient::new(String::new(), String::new(), String::new());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
