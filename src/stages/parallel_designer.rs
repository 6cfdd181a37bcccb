//! ParallelDesigner：同时合成其余所有屏幕
//!
//! 每个待生成屏幕（下标 ≥ 1 且未生成）一次模型调用，Token 按屏幕 id 标记；
//! 调用一次性创建，并发数由 TaskScheduler 限制，按完成顺序收集后再按计划顺序排好。
//! 单个屏幕失败只得到空 HTML，不影响其他屏幕，也不重试。
//! 取消时丢弃仍在进行的调用，已完成的屏幕照常返回提交。

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::state::SessionState;
use crate::core::update::StageUpdate;
use crate::stages::designer::synthesize_screen;
use crate::stages::{Stage, StageContext};

pub struct ParallelDesigner;

#[async_trait]
impl Stage for ParallelDesigner {
    fn id(&self) -> StageId {
        StageId::ParallelDesigner
    }

    fn commits_partial(&self) -> bool {
        true
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate {
        let pending = state.pending_parallel_screens();
        let total = state.planned_screens.len();
        if pending.is_empty() {
            info!("No remaining screens to design");
            return StageUpdate {
                current_screen_index: Some(total),
                ..Default::default()
            };
        }

        info!(
            screens = pending.len(),
            max_parallel = ctx.scheduler.capacity(),
            "Designing remaining screens in parallel"
        );

        let mut jobs: FuturesUnordered<_> = pending
            .into_iter()
            .map(|(index, screen)| {
                let sink = ctx.sink(self.id()).for_screen(&screen.id);
                async move {
                    let _permit = ctx.scheduler.acquire().await;
                    synthesize_screen(state, ctx, index, screen, &sink).await
                }
            })
            .collect();

        let mut results = Vec::with_capacity(jobs.len());
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = jobs.next() => match next {
                    Some(result) => results.push(result),
                    None => break,
                },
            }
        }
        drop(jobs);
        results.sort_by_key(|r| r.index);

        let failed = results.iter().filter(|r| !r.succeeded()).count();
        if failed > 0 {
            warn!(failed, "Some screens could not be designed");
        }
        if cancelled {
            warn!(
                finished = results.len() - failed,
                "Parallel design cancelled, keeping finished screens"
            );
            return StageUpdate {
                synthesized: results,
                ..Default::default()
            };
        }
        info!(designed = results.len() - failed, "Parallel design finished");

        StageUpdate {
            current_screen_index: Some(total),
            synthesized: results,
            ..Default::default()
        }
    }
}
