//! 客户端事件协议：每行一个 JSON（NDJSON），按 `type` 区分
//!
//! 字段名为 camelCase；可选字段缺省时不输出。

use serde::Serialize;

use crate::core::guards::Awaiting;
use crate::core::plan_check::PlanIssue;
use crate::core::state::{DesignSystemOptions, Flow, PlannedScreen, Question, SessionState};

/// 进度步骤名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Clarifying,
    DesignSystem,
    Planning,
    Designing,
    ParallelDesigning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    /// 运行被取消时，正在进行的步骤以此结束
    Paused,
}

/// 屏幕引用（并行开始时列出）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRef {
    pub screen_id: String,
    pub screen_name: String,
    pub screen_index: usize,
}

/// 屏幕结果；失败时 html 为空串
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenResult {
    pub screen_id: String,
    pub screen_name: String,
    pub screen_index: usize,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    RunStarted {
        run_id: String,
        started_at: String,
    },
    /// 模型的推理叙述片段
    Thought {
        content: String,
    },
    ClarificationQuestion {
        question: Question,
        question_index: usize,
    },
    DesignSystemOptions {
        options: DesignSystemOptions,
    },
    Plan {
        screens: Vec<PlannedScreen>,
    },
    Flows {
        flows: Vec<Flow>,
    },
    PlanReady {
        screen_count: usize,
        flow_count: usize,
        issues: Vec<PlanIssue>,
    },
    Step {
        name: StepName,
        status: StepStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen_index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_screens: Option<usize>,
    },
    ScreenStart {
        screen_id: String,
        screen_name: String,
        screen_index: usize,
        total_screens: usize,
    },
    /// 屏幕 HTML 的一个片段，从文档起点开始
    CodeChunk {
        screen_id: String,
        content: String,
    },
    ScreenComplete {
        screen_id: String,
        screen_name: String,
        screen_index: usize,
        html: String,
    },
    ParallelScreensStart {
        screens: Vec<ScreenRef>,
    },
    ParallelScreensComplete {
        screens: Vec<ScreenResult>,
    },
    /// 本次运行结束；客户端保存 state 用于下一轮请求
    Done {
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        awaiting: Option<Awaiting>,
    },
    Error {
        message: String,
    },
}

impl ClientEvent {
    pub fn step(name: StepName, status: StepStatus) -> Self {
        ClientEvent::Step {
            name,
            status,
            screen_name: None,
            screen_index: None,
            total_screens: None,
        }
    }

    /// 事件的 type 名（日志用）
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::RunStarted { .. } => "run_started",
            ClientEvent::Thought { .. } => "thought",
            ClientEvent::ClarificationQuestion { .. } => "clarification_question",
            ClientEvent::DesignSystemOptions { .. } => "design_system_options",
            ClientEvent::Plan { .. } => "plan",
            ClientEvent::Flows { .. } => "flows",
            ClientEvent::PlanReady { .. } => "plan_ready",
            ClientEvent::Step { .. } => "step",
            ClientEvent::ScreenStart { .. } => "screen_start",
            ClientEvent::CodeChunk { .. } => "code_chunk",
            ClientEvent::ScreenComplete { .. } => "screen_complete",
            ClientEvent::ParallelScreensStart { .. } => "parallel_screens_start",
            ClientEvent::ParallelScreensComplete { .. } => "parallel_screens_complete",
            ClientEvent::Done { .. } => "done",
            ClientEvent::Error { .. } => "error",
        }
    }

    /// 序列化为一行 NDJSON（含结尾换行）
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
        });
        line.push('\n');
        line
    }
}
