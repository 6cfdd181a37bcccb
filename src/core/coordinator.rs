//! Coordinator：主控循环
//!
//! 每次请求从入口阶段跑起，阶段自行跳过已完成的工作；每个阶段结束后合并其 StageUpdate，
//! 再由守卫函数决定下一阶段、暂停等待用户或结束。
//! 每个阶段都与取消令牌竞争（`tokio::select!`）：取消时丢弃阶段 future，进行中的模型流随之关闭，
//! 已合并的状态原样返回。`commits_partial` 的阶段（并行合成）自己处理取消，
//! 已完成的屏幕先合并进状态再结束运行。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::guards::{self, Awaiting, Transition};
use crate::core::state::SessionState;
use crate::core::update::SynthesizedScreen;
use crate::events::signal::ExecSignal;
use crate::stages::{standard_stages, Stage, StageContext};

/// 一次运行的结束方式
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// 到达终点
    Finished,
    /// 等待用户输入后由下一次请求继续
    Halted(Awaiting),
    /// 被取消；state 为取消前已合并的部分
    Cancelled { at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: SessionState,
    pub status: RunStatus,
}

pub struct Coordinator {
    stages: HashMap<StageId, Arc<dyn Stage>>,
}

impl Coordinator {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into_iter().map(|s| (s.id(), s)).collect(),
        }
    }

    /// 标准阶段集合
    pub fn standard() -> Self {
        Self::new(standard_stages())
    }

    async fn signal(ctx: &StageContext, signal: ExecSignal) {
        let _ = ctx.signals.send(signal).await;
    }

    /// 跑一次运行，直到暂停、结束或取消
    pub async fn run(&self, mut state: SessionState, ctx: &StageContext) -> RunOutcome {
        let mut current = StageId::ENTRY;

        loop {
            let Some(stage) = self.stages.get(&current) else {
                warn!(stage = %current, "Stage not registered, ending run");
                Self::signal(ctx, ExecSignal::RunFinished { state: state.clone() }).await;
                return RunOutcome {
                    state,
                    status: RunStatus::Finished,
                };
            };

            info!(stage = %current, "Stage started");
            Self::signal(
                ctx,
                ExecSignal::StageEntered {
                    stage: current,
                    snapshot: state.clone(),
                },
            )
            .await;

            let update = if stage.commits_partial() {
                stage.run(&state, ctx).await
            } else {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        warn!(stage = %current, "Run cancelled");
                        Self::signal(
                            ctx,
                            ExecSignal::RunAborted {
                                stage: current,
                                saved: Vec::new(),
                            },
                        )
                        .await;
                        return RunOutcome {
                            state,
                            status: RunStatus::Cancelled { at: Utc::now() },
                        };
                    }
                    update = stage.run(&state, ctx) => update,
                }
            };

            state.apply(&update);

            if ctx.cancel.is_cancelled() {
                let saved: Vec<SynthesizedScreen> = update
                    .synthesized
                    .into_iter()
                    .filter(|s| s.succeeded() && !s.cached)
                    .collect();
                warn!(
                    stage = %current,
                    saved = saved.len(),
                    "Run cancelled, finished screens kept"
                );
                Self::signal(ctx, ExecSignal::RunAborted { stage: current, saved }).await;
                return RunOutcome {
                    state,
                    status: RunStatus::Cancelled { at: Utc::now() },
                };
            }

            Self::signal(
                ctx,
                ExecSignal::StageCompleted {
                    stage: current,
                    update,
                    state: state.clone(),
                },
            )
            .await;

            match guards::next(current, &state) {
                Transition::Next(next) => current = next,
                Transition::Halt(awaiting) => {
                    info!(after = %current, ?awaiting, "Run halted");
                    Self::signal(
                        ctx,
                        ExecSignal::RunHalted {
                            state: state.clone(),
                            awaiting,
                        },
                    )
                    .await;
                    return RunOutcome {
                        state,
                        status: RunStatus::Halted(awaiting),
                    };
                }
                Transition::End => {
                    info!(
                        screens = state.generated_screens.len(),
                        "Run finished"
                    );
                    Self::signal(ctx, ExecSignal::RunFinished { state: state.clone() }).await;
                    return RunOutcome {
                        state,
                        status: RunStatus::Finished,
                    };
                }
            }
        }
    }
}
