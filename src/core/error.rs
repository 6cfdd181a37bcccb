//! 管线错误类型
//!
//! 模型调用失败与解析失败都在阶段内部降级，不会出现在这里。取消体现在 RunStatus 里，也不算错误。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Pipeline task failed: {0}")]
    Join(String),
}
