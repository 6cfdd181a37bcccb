//! 执行信号：Coordinator 与阶段发出的底层事件
//!
//! 信号不直接发给客户端，由 EventTranslator 翻译成协议事件（见 protocol.rs）。

use tokio::sync::mpsc;

use crate::core::graph::StageId;
use crate::core::guards::Awaiting;
use crate::core::state::SessionState;
use crate::core::update::{StageUpdate, SynthesizedScreen};

#[derive(Debug, Clone)]
pub enum ExecSignal {
    RunStarted {
        run_id: String,
        started_at: String,
    },
    /// 进入阶段时的状态快照
    StageEntered {
        stage: StageId,
        snapshot: SessionState,
    },
    /// 模型输出的一个片段；并行阶段带屏幕 id
    Token {
        stage: StageId,
        screen_id: Option<String>,
        text: String,
    },
    StageCompleted {
        stage: StageId,
        update: StageUpdate,
        state: SessionState,
    },
    RunHalted {
        state: SessionState,
        awaiting: Awaiting,
    },
    RunFinished {
        state: SessionState,
    },
    /// 运行在 stage 中途被取消；saved 是该阶段取消前已完成并提交的屏幕
    RunAborted {
        stage: StageId,
        saved: Vec<SynthesizedScreen>,
    },
    RunFailed {
        message: String,
    },
}

pub type SignalSender = mpsc::Sender<ExecSignal>;

/// 单次模型调用的 Token 出口：记录所属阶段与屏幕
#[derive(Debug, Clone)]
pub struct TokenSink {
    stage: StageId,
    screen_id: Option<String>,
    tx: SignalSender,
}

impl TokenSink {
    pub fn new(stage: StageId, tx: SignalSender) -> Self {
        Self {
            stage,
            screen_id: None,
            tx,
        }
    }

    pub fn for_screen(mut self, screen_id: impl Into<String>) -> Self {
        self.screen_id = Some(screen_id.into());
        self
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn screen_id(&self) -> Option<&str> {
        self.screen_id.as_deref()
    }

    /// 转发一个片段；接收端关闭时静默丢弃（取消由 pump 负责）
    pub async fn emit(&self, text: &str) {
        let _ = self
            .tx
            .send(ExecSignal::Token {
                stage: self.stage,
                screen_id: self.screen_id.clone(),
                text: text.to_string(),
            })
            .await;
    }
}
