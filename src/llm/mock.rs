//! Mock LLM 客户端（用于测试与无 API Key 的本地演示）
//!
//! 按脚本规则应答：拼接后的 prompt 包含某个 needle 时返回对应文本，否则返回 fallback。
//! 流式输出按 chunk_chars 切片，每片之间 yield 一次，便于并发场景下观察交错的 Token 流。

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use crate::llm::{flatten_messages, GenerationOptions, LlmClient, LlmError, Message, TokenStream};

const DEFAULT_CHUNK_CHARS: usize = 16;

/// 记录下来的一次调用
#[derive(Debug, Clone)]
pub struct MockCall {
    pub prompt: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Mock 客户端：规则按添加顺序匹配，先命中者生效
#[derive(Debug)]
pub struct MockLlmClient {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    chunk_chars: usize,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Reply::Fail,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// prompt 包含 needle 时返回 response
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(response.into())));
        self
    }

    /// prompt 包含 needle 时返回请求失败
    pub fn with_failure(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail));
        self
    }

    /// 没有规则命中时的回复（默认是请求失败）
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Reply::Text(response.into());
        self
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// 已发生的调用（按时间顺序）
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// prompt 中包含 needle 的调用次数
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    fn respond(&self, messages: &[Message], options: &GenerationOptions) -> Result<String, LlmError> {
        let prompt = flatten_messages(messages);
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone());

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                prompt,
                temperature: options.temperature,
            });
        }

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(LlmError::Request("mock: no scripted reply".to_string())),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.respond(messages, options)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TokenStream, LlmError> {
        let content = self.respond(messages, options)?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect();

        let tokens = stream::iter(chunks).then(|chunk| async move {
            tokio::task::yield_now().await;
            Ok(chunk)
        });
        Ok(Box::pin(tokens))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rule_matching_and_call_log() {
        let mock = MockLlmClient::new()
            .with_rule("alpha", "first")
            .with_fallback("other");

        let opts = GenerationOptions::with_temperature(0.2);
        let a = mock.complete(&[Message::user("say alpha")], &opts).await.unwrap();
        let b = mock.complete(&[Message::user("say beta")], &opts).await.unwrap();

        assert_eq!(a, "first");
        assert_eq!(b, "other");
        assert_eq!(mock.calls().len(), 2);
        assert_eq!(mock.calls_matching("alpha"), 1);
        assert!((mock.calls()[0].temperature - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_stream_is_chunked() {
        let mock = MockLlmClient::new()
            .with_fallback("abcdefghij")
            .with_chunk_chars(4);
        let stream = mock
            .complete_stream(&[Message::user("x")], &GenerationOptions::default())
            .await
            .unwrap();
        let parts: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
        assert_eq!(parts, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn test_failure_rule() {
        let mock = MockLlmClient::new().with_failure("boom").with_fallback("ok");
        let err = mock
            .complete(&[Message::user("boom")], &GenerationOptions::default())
            .await;
        assert!(err.is_err());
    }
}
