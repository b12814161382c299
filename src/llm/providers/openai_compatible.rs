use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::OracleConfig;
use crate::errors::{ClawError, ClawResult};
use crate::llm::prompt::SYSTEM_PROMPT;
use crate::llm::provider::DecisionOracle;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, call: CallConfig) -> Self {
        Self {
            id,
            api_base,
            api_key,
            call,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OracleConfig) -> ClawResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            id: config.display_name.clone(),
            api_base: config.api_base.clone(),
            api_key: config.resolved_api_key(),
            call: CallConfig {
                model: config.model.clone(),
                stream: config.stream,
                temperature: config.temperature,
            },
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        serde_json::json!({
            "model": self.call.model,
            "messages": messages,
            "stream": self.call.stream,
            "temperature": self.call.temperature,
        })
    }
}

#[async_trait]
impl DecisionOracle for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &str) -> ClawResult<String> {
        let body = self.request_body(prompt);

        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            prompt_len = prompt.len(),
            "sending oracle request"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(ClawError::OracleUnavailable(format!("{status}: {err_body}")));
        }

        if self.call.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate the content deltas of an SSE response.
    async fn handle_stream(&self, response: reqwest::Response) -> ClawResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut lines = sse_parser::SseLineBuffer::new();
        let mut content = String::new();
        let mut reasoning_len = 0usize;

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            for line in lines.push(&bytes) {
                match sse_parser::parse_sse_line(&line) {
                    Ok(Some(chunk)) => match chunk.kind {
                        StreamChunkKind::Content => content.push_str(&chunk.content),
                        StreamChunkKind::Reasoning => reasoning_len += chunk.content.len(),
                        StreamChunkKind::Done => break 'stream,
                    },
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("SSE parse skipped: {e}");
                    }
                }
            }
        }

        tracing::info!(
            content_len = content.len(),
            reasoning_len,
            "oracle stream complete"
        );
        Ok(content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> ClawResult<String> {
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ClawError::OracleUnavailable("response has no message content".into()))?
            .to_string();
        tracing::info!(content_len = content.len(), "oracle JSON response received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_prompt_and_model() {
        let provider = OpenAiCompatibleProvider::new(
            "local".into(),
            "http://localhost:1/v1/chat/completions".into(),
            String::new(),
            CallConfig {
                model: "test-model".into(),
                stream: false,
                temperature: 0.0,
            },
        );
        let body = provider.request_body("TASK: open settings");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "TASK: open settings");
        assert_eq!(body["stream"], false);
    }
}
