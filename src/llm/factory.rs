//! 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
//!
//! DeepSeek 提供与 OpenAI 完全兼容的 API 接口：
//! - Base URL: https://api.deepseek.com
//! - 默认模型: deepseek-chat，可用 DEEPSEEK_MODEL 或配置覆盖

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::stages::prompts::{ARCHITECT_TASK, CLARIFIER_TASK, DESIGNER_TASK, DESIGN_SYSTEM_TASK};

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端
///
/// - 优先使用环境变量 `DEEPSEEK_API_KEY`
/// - 模型可通过 `model` 参数或 `DEEPSEEK_MODEL` 环境变量指定
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, api_key.as_deref())
}

/// 按配置创建后端；provider 为 mock 或找不到任何 API Key 时退回演示用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using scripted demo LLM (provider = mock)");
        return Arc::new(demo_client());
    }

    let request_timeout = cfg.llm.timeouts.request;
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)).with_request_timeout(request_timeout))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(base, &model, std::env::var("OPENAI_API_KEY").ok().as_deref())
                .with_request_timeout(request_timeout),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using scripted demo LLM");
        Arc::new(demo_client())
    }
}

/// 无 API Key 时的演示脚本：直接就绪、两屏计划、极简页面
pub fn demo_client() -> MockLlmClient {
    MockLlmClient::new()
        .with_rule(
            CLARIFIER_TASK,
            "<thinking>The idea is clear enough to plan.</thinking>\n```json\n{\"ready\": true, \"summary\": \"demo\"}\n```",
        )
        .with_rule(
            DESIGN_SYSTEM_TASK,
            "```json\n{\"fonts\": [{\"name\": \"Inter\", \"family\": \"Inter, sans-serif\", \"description\": \"Neutral grotesk\"}], \"vibes\": [{\"name\": \"Calm\", \"description\": \"Soft and airy\", \"keywords\": [\"minimal\", \"soft\"], \"emoji\": \"🌿\"}]}\n```",
        )
        .with_rule(
            ARCHITECT_TASK,
            "<thinking>Two screens are enough for a demo.</thinking>\n```json\n{\"screens\": [{\"id\": \"home\", \"name\": \"Home\", \"description\": \"Landing screen\"}, {\"id\": \"detail\", \"name\": \"Detail\", \"description\": \"Item detail\"}], \"flows\": [{\"id\": \"flow-1\", \"from\": \"home\", \"to\": \"detail\", \"label\": \"Open item\"}]}\n```",
        )
        .with_rule(
            DESIGNER_TASK,
            "Here is the screen:\n```html\n<!DOCTYPE html>\n<html><head><title>Demo</title></head><body><main><h1>Demo screen</h1></main></body></html>\n```",
        )
}
