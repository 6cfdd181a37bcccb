//! Screenloom - 一句话产品想法到多屏 UI 的流式生成管线
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、阶段图与守卫、主控循环、运行监管、并发调度
//! - **events**: 执行信号 → 客户端 NDJSON 事件（thinking 抽取、按屏幕分流）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: tracing 日志初始化
//! - **parse**: 模型输出解析（JSON 块、HTML 清洗）
//! - **runtime**: 无头运行时（供命令行与 HTTP 调用）
//! - **stages**: 澄清、设计系统、规划、单屏与并行屏幕合成

pub mod config;
pub mod core;
pub mod events;
pub mod llm;
pub mod observability;
pub mod parse;
pub mod runtime;
pub mod stages;

pub use runtime::{Pipeline, RunHandle};
