//! 阶段图：节点标识
//!
//! clarifier → design_system → architect → { designer → save_screen → parallel_designer | parallel_designer } → end
//! 边由 guards.rs 中的纯函数决定。

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Clarifier,
    DesignSystem,
    Architect,
    Designer,
    SaveScreen,
    ParallelDesigner,
}

impl StageId {
    /// 每次运行都从这里进入，由各阶段自行跳过已完成的工作
    pub const ENTRY: StageId = StageId::Clarifier;

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Clarifier => "clarifier",
            StageId::DesignSystem => "design_system",
            StageId::Architect => "architect",
            StageId::Designer => "designer",
            StageId::SaveScreen => "save_screen",
            StageId::ParallelDesigner => "parallel_designer",
        }
    }

    /// 输出中带 <thinking> 叙述的阶段
    pub fn narrates_thinking(&self) -> bool {
        matches!(
            self,
            StageId::Clarifier | StageId::DesignSystem | StageId::Architect
        )
    }

    /// 输出 HTML 的阶段
    pub fn emits_markup(&self) -> bool {
        matches!(self, StageId::Designer | StageId::ParallelDesigner)
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
