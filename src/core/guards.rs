//! 守卫函数：阶段结束后决定下一步
//!
//! 全部是 `&SessionState` 的纯函数，不做 IO、不看时间。

use serde::{Deserialize, Serialize};

use crate::core::graph::StageId;
use crate::core::state::SessionState;

/// 运行暂停时在等待的用户输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Awaiting {
    /// 回答澄清问题
    Answer,
    /// 选择字体与风格
    DesignSelection,
    /// 批准或修改计划
    PlanApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(StageId),
    Halt(Awaiting),
    End,
}

pub fn after_clarifier(state: &SessionState) -> Transition {
    if state.clarification_complete || state.checkpoint_passed() {
        Transition::Next(StageId::DesignSystem)
    } else {
        Transition::Halt(Awaiting::Answer)
    }
}

pub fn after_design_system(state: &SessionState) -> Transition {
    if state.checkpoint_passed() || state.selected_design_system.is_some() {
        return Transition::Next(StageId::Architect);
    }
    match &state.design_system_options {
        Some(options) if !options.is_empty() => Transition::Halt(Awaiting::DesignSelection),
        _ => Transition::Next(StageId::Architect),
    }
}

pub fn after_architect(state: &SessionState) -> Transition {
    if state.is_resume_mode() {
        if state.entry_screen_generated() {
            Transition::Next(StageId::ParallelDesigner)
        } else {
            Transition::Next(StageId::Designer)
        }
    } else if state.design_approved {
        Transition::Next(StageId::Designer)
    } else {
        Transition::Halt(Awaiting::PlanApproval)
    }
}

/// 第一个屏幕没生成出来就结束本轮，下一轮恢复时重试它
pub fn after_save_screen(state: &SessionState) -> Transition {
    if state.planned_screens.len() > 1 && state.entry_screen_generated() {
        Transition::Next(StageId::ParallelDesigner)
    } else {
        Transition::End
    }
}

/// 阶段 `stage` 完成后的转移
pub fn next(stage: StageId, state: &SessionState) -> Transition {
    match stage {
        StageId::Clarifier => after_clarifier(state),
        StageId::DesignSystem => after_design_system(state),
        StageId::Architect => after_architect(state),
        StageId::Designer => Transition::Next(StageId::SaveScreen),
        StageId::SaveScreen => after_save_screen(state),
        StageId::ParallelDesigner => Transition::End,
    }
}
