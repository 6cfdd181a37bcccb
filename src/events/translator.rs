//! 执行信号 → 客户端事件
//!
//! 同步状态机：按阶段维护 thinking 抽取器，按屏幕 id 维护 HTML 检测器，
//! 并行阶段多个屏幕的 Token 交错到达时按 id 各自归位。
//! `pump` 负责从信号通道读、往客户端通道写；客户端断开时取消运行。

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::graph::StageId;
use crate::core::state::SessionState;
use crate::core::update::{StageUpdate, SynthesizedScreen};
use crate::events::code_chunk::CodeChunkDetector;
use crate::events::protocol::{ClientEvent, ScreenRef, ScreenResult, StepName, StepStatus};
use crate::events::signal::ExecSignal;
use crate::events::thinking::ThinkingExtractor;

/// 阶段对应的进度步骤名；SaveScreen 不对外显示
pub fn step_name(stage: StageId) -> Option<StepName> {
    match stage {
        StageId::Clarifier => Some(StepName::Clarifying),
        StageId::DesignSystem => Some(StepName::DesignSystem),
        StageId::Architect => Some(StepName::Planning),
        StageId::Designer => Some(StepName::Designing),
        StageId::ParallelDesigner => Some(StepName::ParallelDesigning),
        StageId::SaveScreen => None,
    }
}

#[derive(Debug, Default)]
pub struct EventTranslator {
    thinking: HashMap<StageId, ThinkingExtractor>,
    code: HashMap<String, CodeChunkDetector>,
    running: Option<StepName>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, signal: ExecSignal) -> Vec<ClientEvent> {
        match signal {
            ExecSignal::RunStarted { run_id, started_at } => {
                vec![ClientEvent::RunStarted { run_id, started_at }]
            }
            ExecSignal::StageEntered { stage, snapshot } => self.stage_entered(stage, &snapshot),
            ExecSignal::Token {
                stage,
                screen_id,
                text,
            } => self.token(stage, screen_id, &text),
            ExecSignal::StageCompleted {
                stage,
                update,
                state,
            } => self.stage_completed(stage, &update, state),
            ExecSignal::RunHalted { state, awaiting } => vec![ClientEvent::Done {
                state,
                awaiting: Some(awaiting),
            }],
            ExecSignal::RunFinished { state } => vec![ClientEvent::Done {
                state,
                awaiting: None,
            }],
            ExecSignal::RunAborted { stage, saved } => self.aborted(stage, &saved),
            ExecSignal::RunFailed { message } => vec![ClientEvent::Error { message }],
        }
    }

    fn stage_entered(&mut self, stage: StageId, snapshot: &SessionState) -> Vec<ClientEvent> {
        let Some(name) = step_name(stage) else {
            return Vec::new();
        };
        self.running = Some(name);
        if stage.narrates_thinking() {
            self.thinking.insert(stage, ThinkingExtractor::new());
        }

        let total = snapshot.planned_screens.len();
        match stage {
            StageId::Designer => {
                let index = snapshot.designer_screen_index();
                let Some(screen) = snapshot.planned_screens.get(index) else {
                    return vec![ClientEvent::step(name, StepStatus::Started)];
                };
                self.code.insert(screen.id.clone(), CodeChunkDetector::new());
                vec![
                    ClientEvent::Step {
                        name,
                        status: StepStatus::Started,
                        screen_name: Some(screen.name.clone()),
                        screen_index: Some(index),
                        total_screens: Some(total),
                    },
                    ClientEvent::ScreenStart {
                        screen_id: screen.id.clone(),
                        screen_name: screen.name.clone(),
                        screen_index: index,
                        total_screens: total,
                    },
                ]
            }
            StageId::ParallelDesigner => {
                let screens: Vec<ScreenRef> = snapshot
                    .pending_parallel_screens()
                    .into_iter()
                    .map(|(index, screen)| {
                        self.code.insert(screen.id.clone(), CodeChunkDetector::new());
                        ScreenRef {
                            screen_id: screen.id.clone(),
                            screen_name: screen.name.clone(),
                            screen_index: index,
                        }
                    })
                    .collect();
                vec![
                    ClientEvent::Step {
                        name,
                        status: StepStatus::Started,
                        screen_name: None,
                        screen_index: None,
                        total_screens: Some(total),
                    },
                    ClientEvent::ParallelScreensStart { screens },
                ]
            }
            _ => vec![ClientEvent::step(name, StepStatus::Started)],
        }
    }

    fn token(&mut self, stage: StageId, screen_id: Option<String>, text: &str) -> Vec<ClientEvent> {
        if stage.narrates_thinking() {
            return self
                .thinking
                .entry(stage)
                .or_default()
                .push(text)
                .map(|content| vec![ClientEvent::Thought { content }])
                .unwrap_or_default();
        }
        if stage.emits_markup() {
            let Some(screen_id) = screen_id else {
                debug!(stage = %stage, "Markup token without screen id dropped");
                return Vec::new();
            };
            let detector = self.code.entry(screen_id.clone()).or_default();
            return detector
                .push(text)
                .map(|content| vec![ClientEvent::CodeChunk { screen_id, content }])
                .unwrap_or_default();
        }
        Vec::new()
    }

    fn stage_completed(
        &mut self,
        stage: StageId,
        update: &StageUpdate,
        state: SessionState,
    ) -> Vec<ClientEvent> {
        let Some(name) = step_name(stage) else {
            return Vec::new();
        };
        self.running = None;
        if let Some(extractor) = self.thinking.remove(&stage) {
            if !extractor.is_done() {
                debug!(stage = %stage, "Reply had no closed thinking segment");
            }
        }

        let mut events = vec![ClientEvent::step(name, StepStatus::Completed)];
        match stage {
            StageId::Clarifier => {
                if let (Some(question), false) =
                    (state.current_question.clone(), state.clarification_complete)
                {
                    events.push(ClientEvent::ClarificationQuestion {
                        question,
                        question_index: state.question_index(),
                    });
                }
            }
            StageId::DesignSystem => {
                if let Some(options) = update.design_system_options.clone() {
                    if !options.is_empty() {
                        events.push(ClientEvent::DesignSystemOptions { options });
                    }
                }
            }
            StageId::Architect => {
                events.push(ClientEvent::Plan {
                    screens: state.planned_screens.clone(),
                });
                events.push(ClientEvent::Flows {
                    flows: state.planned_flows.clone(),
                });
                events.push(ClientEvent::PlanReady {
                    screen_count: state.planned_screens.len(),
                    flow_count: state.planned_flows.len(),
                    issues: update.plan_issues.clone(),
                });
            }
            StageId::Designer => {
                for screen in &update.synthesized {
                    self.finish_screen(screen);
                    events.push(screen_complete(screen));
                }
            }
            StageId::ParallelDesigner => {
                let screens = update
                    .synthesized
                    .iter()
                    .map(|screen| {
                        self.finish_screen(screen);
                        screen_result(screen)
                    })
                    .collect();
                events.push(ClientEvent::ParallelScreensComplete { screens });
            }
            StageId::SaveScreen => {}
        }
        events
    }

    /// 取消：先报告已保存的屏幕，再把进行中的步骤标为 paused
    fn aborted(&mut self, stage: StageId, saved: &[SynthesizedScreen]) -> Vec<ClientEvent> {
        let mut events: Vec<ClientEvent> = saved
            .iter()
            .map(|screen| {
                self.finish_screen(screen);
                screen_complete(screen)
            })
            .collect();
        if let Some(name) = step_name(stage).or(self.running.take()) {
            events.push(ClientEvent::step(name, StepStatus::Paused));
        }
        events
    }

    fn finish_screen(&mut self, screen: &SynthesizedScreen) {
        if let Some(detector) = self.code.remove(&screen.id) {
            if screen.succeeded() && !screen.cached && !detector.started() {
                debug!(screen_id = %screen.id, "No document start in streamed markup, no code chunks sent");
            }
        }
    }
}

fn screen_complete(screen: &SynthesizedScreen) -> ClientEvent {
    ClientEvent::ScreenComplete {
        screen_id: screen.id.clone(),
        screen_name: screen.name.clone(),
        screen_index: screen.index,
        html: screen.html.clone(),
    }
}

fn screen_result(screen: &SynthesizedScreen) -> ScreenResult {
    ScreenResult {
        screen_id: screen.id.clone(),
        screen_name: screen.name.clone(),
        screen_index: screen.index,
        html: screen.html.clone(),
    }
}

/// 把信号翻译后写入客户端通道，直到信号通道关闭
///
/// 客户端通道关闭（断开连接）时取消运行，并继续排空信号以免阻塞 Coordinator。
pub async fn pump(
    mut signals: mpsc::Receiver<ExecSignal>,
    out: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
) {
    let mut translator = EventTranslator::new();
    let mut client_gone = false;

    while let Some(signal) = signals.recv().await {
        if client_gone {
            continue;
        }
        for event in translator.translate(signal) {
            if out.send(event).await.is_err() {
                warn!("Client disconnected, cancelling run");
                cancel.cancel();
                client_gone = true;
                break;
            }
        }
    }
}
