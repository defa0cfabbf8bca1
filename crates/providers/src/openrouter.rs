//! OpenAI-compatible chat adapter.
//!
//! Works with OpenRouter and any other endpoint following the OpenAI
//! chat-completions contract (`/chat/completions`, SSE streaming with
//! `data: [DONE]` termination).

use std::time::Duration;

use serde_json::Value;

use fathom_domain::config::LlmConfig;
use fathom_domain::error::{Error, Result};
use fathom_domain::message::Message;
use fathom_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::traits::{ChatClient, ChatRequest, ChatResponse};
use crate::util::{from_reqwest, key_from_env};

pub struct OpenRouterClient {
    base_url: String,
    api_key: String,
    default_model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenRouterClient {
    /// Build the adapter from config, resolving the API key from the
    /// configured environment variable.
    pub fn from_config(cfg: &LlmConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = key_from_env("chat", &cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| from_reqwest("chat", e))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            temperature: cfg.temperature,
            client,
        })
    }

    fn authed_post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });
        body["temperature"] = serde_json::json!(req.temperature.unwrap_or(self.temperature));
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenRouterClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_chat_body(&req, false);
        let response = self
            .authed_post()
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest("chat", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::capability(
                "chat",
                format!("HTTP {status}: {}", truncate(&text, 300)),
            ));
        }

        let value: Value = response.json().await.map_err(|e| from_reqwest("chat", e))?;
        parse_chat_response(&value)
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_chat_body(&req, true);
        let response = self
            .authed_post()
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest("chat", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::capability(
                "chat",
                format!("HTTP {status}: {}", truncate(&text, 300)),
            ));
        }

        Ok(stream_events(response))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incremental SSE frame buffer.
///
/// The chat-completions stream is framed on blank lines; each frame may
/// carry `event:`/`id:`/`retry:` metadata, but only its `data:` lines
/// matter here. Chunks go in as they arrive off the wire; complete
/// payloads come out, and a trailing partial frame stays buffered until
/// the next chunk (or [`SseFrames::finish`]) completes it.
#[derive(Default)]
struct SseFrames {
    buf: String,
}

impl SseFrames {
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut payloads = Vec::new();
        while let Some(end) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..end + 2).collect();
            payloads.extend(data_payloads(&frame));
        }
        payloads
    }

    /// Flush the remainder once the body closes. Servers are allowed to
    /// omit the final blank line.
    fn finish(self) -> Vec<String> {
        data_payloads(&self.buf)
    }
}

fn data_payloads(frame: &str) -> Vec<String> {
    frame
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|payload| !payload.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn the response body into a [`StreamEvent`] stream, guaranteeing a
/// terminal `Done` even when the provider hangs up without one.
fn stream_events(response: reqwest::Response) -> BoxStream<'static, Result<StreamEvent>> {
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut frames = SseFrames::default();
        let mut saw_done = false;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(None) => break,
                Err(e) => {
                    yield Err(from_reqwest("chat", e));
                    return;
                }
            };
            for payload in frames.push(&chunk) {
                for event in parse_stream_data(&payload) {
                    saw_done |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        for payload in frames.finish() {
            for event in parse_stream_data(&payload) {
                saw_done |= matches!(&event, Ok(StreamEvent::Done { .. }));
                yield event;
            }
        }

        if !saw_done {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire format helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_wire(msg: &Message) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content,
    })
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::capability("chat", "no choices in response"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| Error::capability("chat", "no message in choice"))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_usage);

    Ok(ChatResponse {
        content,
        usage,
        model,
        finish_reason,
    })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let input = v.get("prompt_tokens")?.as_u64()? as u32;
    let output = v.get("completion_tokens")?.as_u64()? as u32;
    Some(Usage::new(input, output))
}

/// Parse one SSE `data:` payload into stream events.
///
/// Malformed chunks are skipped rather than surfaced — a single bad
/// delta must not kill the stream.
fn parse_stream_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream chunk");
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if let Some(choice) = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    {
        if let Some(text) = choice
            .pointer("/delta/content")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
        {
            events.push(Ok(StreamEvent::Token { text: text.into() }));
        }
        if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            events.push(Ok(StreamEvent::Done {
                usage: value.get("usage").and_then(parse_usage),
                finish_reason: Some(reason.into()),
            }));
        }
    } else if let Some(usage) = value.get("usage").and_then(parse_usage) {
        // Final usage-only frame from stream_options.include_usage.
        events.push(Ok(StreamEvent::Done {
            usage: Some(usage),
            finish_reason: None,
        }));
    }

    events
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_response() {
        let body = serde_json::json!({
            "model": "acme/fast",
            "choices": [{
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.model, "acme/fast");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn missing_choices_is_an_error() {
        let body = serde_json::json!({"model": "m"});
        assert!(parse_chat_response(&body).is_err());
    }

    #[test]
    fn stream_done_marker() {
        let events = parse_stream_data("[DONE]");
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn stream_token_delta() {
        let events = parse_stream_data(
            r#"{"choices":[{"delta":{"content":"hi"}}]}"#,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::Token { text }) => assert_eq!(text, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn stream_malformed_chunk_is_skipped() {
        assert!(parse_stream_data("{not json").is_empty());
    }

    #[test]
    fn stream_usage_only_frame() {
        let events = parse_stream_data(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
        );
        match &events[0] {
            Ok(StreamEvent::Done { usage: Some(u), .. }) => assert_eq!(u.total_tokens, 12),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wire_message_shape() {
        let value = msg_to_wire(&Message::user("q"));
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "q");
    }

    // ── SSE frame buffer ───────────────────────────────────────────

    #[test]
    fn frames_split_on_blank_lines() {
        let mut frames = SseFrames::default();
        let payloads = frames.push("data: one\n\ndata: two\n\n");
        assert_eq!(payloads, vec!["one", "two"]);
        assert!(frames.buf.is_empty());
    }

    #[test]
    fn frames_hold_partial_until_completed() {
        let mut frames = SseFrames::default();
        assert!(frames.push("data: {\"cho").is_empty());
        assert!(frames.push("ices\":[]}").is_empty());
        let payloads = frames.push("\n\n");
        assert_eq!(payloads, vec![r#"{"choices":[]}"#]);
    }

    #[test]
    fn frames_finish_flushes_unterminated_tail() {
        let mut frames = SseFrames::default();
        assert_eq!(frames.push("data: first\n\ndata: last"), vec!["first"]);
        assert_eq!(frames.finish(), vec!["last"]);
    }

    #[test]
    fn frames_done_sentinel_survives_intact() {
        let mut frames = SseFrames::default();
        let payloads = frames.push("data: [DONE]\n\n");
        assert_eq!(payloads, vec!["[DONE]"]);
        assert!(matches!(
            parse_stream_data(&payloads[0])[0],
            Ok(StreamEvent::Done { .. })
        ));
    }

    #[test]
    fn frames_trim_whitespace_after_data_prefix() {
        let mut frames = SseFrames::default();
        assert_eq!(frames.push("data:   padded  \n\n"), vec!["padded"]);
        assert_eq!(frames.push("data:tight\n\n"), vec!["tight"]);
    }

    #[test]
    fn frames_skip_metadata_and_empty_data_lines() {
        let mut frames = SseFrames::default();
        let payloads = frames.push("event: ping\nid: 7\nretry: 100\ndata:\n\ndata: real\n\n");
        assert_eq!(payloads, vec!["real"]);
    }

    #[test]
    fn frames_take_multiple_data_lines_per_frame() {
        let mut frames = SseFrames::default();
        assert_eq!(frames.push("data: a\ndata: b\n\n"), vec!["a", "b"]);
    }

    #[test]
    fn frames_empty_input_yields_nothing() {
        let mut frames = SseFrames::default();
        assert!(frames.push("").is_empty());
        assert!(frames.finish().is_empty());
    }
}
