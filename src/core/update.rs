//! 阶段输出：对 SessionState 的部分更新
//!
//! 阶段之间不直接改状态，而是各自返回 StageUpdate，由 Coordinator 调用 `SessionState::apply` 合并。
//! 合并时统一保证以下约束：
//! - 对话历史只追加
//! - enriched_request、reference_html 一旦非空即冻结
//! - design_system_complete 只能由 false 变 true
//! - generated_screens 只追加；重复 id 与空 HTML 不提交

use crate::core::plan_check::PlanIssue;
use crate::core::state::{
    DesignSystemOptions, Flow, GeneratedScreen, PlannedScreen, Question, SessionState, Turn,
};

/// 一次屏幕合成的结果（成功、失败或命中缓存）
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedScreen {
    pub index: usize,
    pub id: String,
    pub name: String,
    /// 失败时为空串
    pub html: String,
    /// 已在 generated_screens 中，未调用模型
    pub cached: bool,
}

impl SynthesizedScreen {
    pub fn succeeded(&self) -> bool {
        !self.html.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageUpdate {
    pub append_history: Vec<Turn>,
    /// Some(None) 表示清除当前问题
    pub current_question: Option<Option<Question>>,
    pub clarification_complete: Option<bool>,
    pub enriched_request: Option<String>,
    pub design_system_options: Option<DesignSystemOptions>,
    pub mark_design_system_complete: bool,
    pub planned_screens: Option<Vec<PlannedScreen>>,
    pub planned_flows: Option<Vec<Flow>>,
    pub clear_plan_feedback: bool,
    /// 仅用于事件上报，不进入状态
    pub plan_issues: Vec<PlanIssue>,
    pub current_screen_index: Option<usize>,
    pub reference_html: Option<String>,
    pub synthesized: Vec<SynthesizedScreen>,
}

impl StageUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl SessionState {
    /// 合并阶段输出
    pub fn apply(&mut self, update: &StageUpdate) {
        self.conversation_history
            .extend(update.append_history.iter().cloned());

        if let Some(question) = &update.current_question {
            self.current_question = question.clone();
        }
        if let Some(done) = update.clarification_complete {
            self.clarification_complete = done;
        }
        if let Some(enriched) = &update.enriched_request {
            if self.enriched_request.trim().is_empty() && !enriched.trim().is_empty() {
                self.enriched_request = enriched.clone();
            }
        }
        if let Some(options) = &update.design_system_options {
            self.design_system_options = Some(options.clone());
        }
        if update.mark_design_system_complete {
            self.design_system_complete = true;
        }
        if let Some(screens) = &update.planned_screens {
            self.planned_screens = screens.clone();
        }
        if let Some(flows) = &update.planned_flows {
            self.planned_flows = flows.clone();
        }
        if update.clear_plan_feedback {
            self.plan_feedback.clear();
        }
        if let Some(index) = update.current_screen_index {
            self.current_screen_index = index;
        }
        if let Some(html) = &update.reference_html {
            if self.reference_html.is_empty() && !html.trim().is_empty() {
                self.reference_html = html.clone();
            }
        }
        for screen in &update.synthesized {
            if screen.cached || !screen.succeeded() || self.generated(&screen.id).is_some() {
                continue;
            }
            self.generated_screens.push(GeneratedScreen {
                id: screen.id.clone(),
                name: screen.name.clone(),
                html: screen.html.clone(),
            });
        }
    }
}
