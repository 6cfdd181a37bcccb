//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 每次调用都带 GenerationOptions，管线各阶段用不同温度调用同一个后端。

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::llm::Message;

/// 流式完成返回的 Token 流
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 单次调用的生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.7 }
    }
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self { temperature }
    }
}

/// 模型调用失败（网络、超时、提供方错误）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Model call timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response from model")]
    EmptyResponse,
}

/// 给一次模型请求加时限（至少 1 秒）；超时返回 LlmError::Timeout
pub async fn with_timeout<T, F>(secs: u64, request: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    let secs = secs.max(1);
    tokio::time::timeout(Duration::from_secs(secs), request)
        .await
        .unwrap_or(Err(LlmError::Timeout(secs)))
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流；丢弃返回的流即中止底层请求
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TokenStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
