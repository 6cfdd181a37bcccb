//! 管线阶段
//!
//! 每个阶段无状态：读 `&SessionState`，通过 StageContext 调用模型，返回 StageUpdate。
//! 模型或解析失败在阶段内部降级处理，阶段本身不返回错误。

pub mod architect;
pub mod clarifier;
pub mod design_system;
pub mod designer;
pub mod parallel_designer;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PipelineSection;
use crate::core::graph::StageId;
use crate::core::state::SessionState;
use crate::core::task_scheduler::TaskScheduler;
use crate::core::update::StageUpdate;
use crate::events::signal::{SignalSender, TokenSink};
use crate::llm::{with_timeout, GenerationOptions, LlmClient, LlmError, Message};

pub use architect::Architect;
pub use clarifier::Clarifier;
pub use design_system::DesignSystemProposer;
pub use designer::{Designer, SaveScreen};
pub use parallel_designer::ParallelDesigner;

#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// 为 true 时阶段自己监听取消，并返回取消前已完成的部分；Coordinator 不再丢弃它的 future
    fn commits_partial(&self) -> bool {
        false
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate;
}

/// 阶段运行时依赖：模型、参数、信号出口、并发调度、取消令牌
#[derive(Clone)]
pub struct StageContext {
    pub llm: Arc<dyn LlmClient>,
    pub settings: PipelineSection,
    pub signals: SignalSender,
    pub scheduler: Arc<TaskScheduler>,
    pub cancel: CancellationToken,
    pub system_prompt: String,
}

impl StageContext {
    pub fn sink(&self, stage: StageId) -> TokenSink {
        TokenSink::new(stage, self.signals.clone())
    }

    /// 一次流式模型调用：逐片转发到 sink，返回完整文本
    pub async fn invoke(
        &self,
        sink: &TokenSink,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(prompt.to_string()),
        ];
        let options = GenerationOptions::with_temperature(temperature);
        debug!(
            stage = %sink.stage(),
            screen = sink.screen_id().unwrap_or("-"),
            model = self.llm.model_name(),
            temperature,
            "model call"
        );

        let collect = async {
            let mut stream = self.llm.complete_stream(&messages, &options).await?;
            let mut text = String::new();
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                if fragment.is_empty() {
                    continue;
                }
                sink.emit(&fragment).await;
                text.push_str(&fragment);
            }
            if text.trim().is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            Ok(text)
        };

        with_timeout(self.settings.stream_timeout_secs, collect).await
    }
}

/// 管线的标准阶段集合
pub fn standard_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(Clarifier),
        Arc::new(DesignSystemProposer),
        Arc::new(Architect),
        Arc::new(Designer),
        Arc::new(SaveScreen),
        Arc::new(ParallelDesigner),
    ]
}
