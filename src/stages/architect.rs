//! Architect：规划屏幕与导航
//!
//! - 计划已批准且存在：直接沿用，不调用模型
//! - 有修改意见且已有计划：带上当前计划与意见做修订，意见记入历史后清空
//! - 解析失败：返回空计划（停滞，而不是崩溃）
//!
//! 解析后的计划交给 plan_check 校验，问题只记录与上报，不做修复。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::plan_check::validate_plan;
use crate::core::state::{Flow, PlannedScreen, SessionState, Turn};
use crate::core::update::StageUpdate;
use crate::parse::{parse_structured, StructuredResponse};
use crate::stages::{prompts, Stage, StageContext};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanResponse {
    pub screens: Vec<PlannedScreen>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl StructuredResponse for PlanResponse {}

/// 去掉首尾空白并补齐缺失的 flow id（flow-N）
pub fn normalize_plan(mut plan: PlanResponse) -> (Vec<PlannedScreen>, Vec<Flow>) {
    for screen in &mut plan.screens {
        screen.id = screen.id.trim().to_string();
    }
    for (i, flow) in plan.flows.iter_mut().enumerate() {
        flow.from = flow.from.trim().to_string();
        flow.to = flow.to.trim().to_string();
        if flow.id.trim().is_empty() {
            flow.id = format!("flow-{}", i + 1);
        }
    }
    (plan.screens, plan.flows)
}

pub struct Architect;

#[async_trait]
impl Stage for Architect {
    fn id(&self) -> StageId {
        StageId::Architect
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate {
        if state.design_approved && state.has_plan() {
            let index = if state.is_resume_mode() {
                state.current_screen_index
            } else {
                0
            };
            info!(
                screens = state.planned_screens.len(),
                current_screen_index = index,
                "Plan already approved, reusing it"
            );
            return StageUpdate {
                planned_screens: Some(state.planned_screens.clone()),
                planned_flows: Some(state.planned_flows.clone()),
                current_screen_index: Some(index),
                ..Default::default()
            };
        }

        let revising = state.has_plan_feedback() && state.has_plan();
        let schema = prompts::response_schema::<PlanResponse>();
        let prompt = if revising {
            prompts::architect_revision(state, &schema)
        } else {
            prompts::architect(state, &schema)
        };

        let mut update = StageUpdate {
            current_screen_index: Some(0),
            ..Default::default()
        };
        if state.has_plan_feedback() {
            update.append_history.push(Turn::PlanFeedback {
                feedback: state.plan_feedback.trim().to_string(),
            });
            update.clear_plan_feedback = true;
        }

        let parsed = match ctx
            .invoke(&ctx.sink(self.id()), &prompt, ctx.settings.temperatures.architect)
            .await
        {
            Ok(text) => parse_structured::<PlanResponse>(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let (screens, flows) = match parsed {
            Ok(plan) => normalize_plan(plan),
            Err(reason) => {
                warn!(error = %reason, "Architect produced no usable plan");
                (Vec::new(), Vec::new())
            }
        };

        if let Err(invalid) = validate_plan(&screens, &flows) {
            for issue in &invalid.issues {
                warn!(issue = %issue, "Plan issue");
            }
            update.plan_issues = invalid.issues;
        }

        info!(
            screens = screens.len(),
            flows = flows.len(),
            revised = revising,
            "Plan ready"
        );
        update.planned_screens = Some(screens);
        update.planned_flows = Some(flows);
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan_check::PlanIssue;
    use crate::core::state::GeneratedScreen;
    use crate::llm::MockLlmClient;
    use crate::stages::test_support;
    use std::sync::Arc;

    const PLAN_REPLY: &str = "<thinking>Three screens.</thinking>\n```json\n{\"screens\": [{\"id\": \"home\", \"name\": \"Home\"}, {\"id\": \"list\", \"name\": \"List\"}, {\"id\": \"detail\", \"name\": \"Detail\"}], \"flows\": [{\"from\": \"home\", \"to\": \"list\"}, {\"from\": \"list\", \"to\": \"detail\"}]}\n```";

    fn screen(id: &str) -> PlannedScreen {
        PlannedScreen {
            id: id.into(),
            name: id.into(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_plans_and_fills_flow_ids() {
        let mock = Arc::new(MockLlmClient::new().with_rule(prompts::ARCHITECT_TASK, PLAN_REPLY));
        let (ctx, _rx) = test_support::context(mock);
        let update = Architect.run(&SessionState::new("a todo app"), &ctx).await;

        let screens = update.planned_screens.unwrap();
        let flows = update.planned_flows.unwrap();
        assert_eq!(screens.len(), 3);
        assert_eq!(flows[1].id, "flow-2");
        assert!(update.plan_issues.is_empty());
        assert_eq!(update.current_screen_index, Some(0));
    }

    #[tokio::test]
    async fn test_approved_plan_short_circuits_and_keeps_resume_index() {
        let mock = Arc::new(MockLlmClient::new().with_rule(prompts::ARCHITECT_TASK, PLAN_REPLY));
        let (ctx, _rx) = test_support::context(mock.clone());
        let mut state = SessionState::new("x");
        state.design_approved = true;
        state.planned_screens = vec![screen("a"), screen("b")];
        state.current_screen_index = 1;
        state.generated_screens.push(GeneratedScreen {
            id: "a".into(),
            name: "a".into(),
            html: "<html></html>".into(),
        });

        let update = Architect.run(&state, &ctx).await;
        assert_eq!(update.current_screen_index, Some(1));
        assert_eq!(update.planned_screens.unwrap().len(), 2);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_revises_and_is_recorded() {
        let mock = Arc::new(MockLlmClient::new().with_rule(prompts::REVISION_HEADER, PLAN_REPLY));
        let (ctx, _rx) = test_support::context(mock.clone());
        let mut state = SessionState::new("x");
        state.planned_screens = vec![screen("a"), screen("b")];
        state.plan_feedback = "make it three screens".into();

        let update = Architect.run(&state, &ctx).await;
        assert_eq!(mock.calls_matching("make it three screens"), 1);
        assert!(update.clear_plan_feedback);
        assert_eq!(
            update.append_history,
            vec![Turn::PlanFeedback {
                feedback: "make it three screens".into()
            }]
        );
        assert_eq!(update.planned_screens.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_parse_failure_gives_empty_plan() {
        let mock = Arc::new(MockLlmClient::new().with_fallback("I could not decide."));
        let (ctx, _rx) = test_support::context(mock);
        let update = Architect.run(&SessionState::new("x"), &ctx).await;
        assert_eq!(update.planned_screens, Some(Vec::new()));
        assert_eq!(update.planned_flows, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_convergent_plan_is_reported_not_repaired() {
        let reply = "{\"screens\": [{\"id\": \"a\", \"name\": \"A\"}, {\"id\": \"b\", \"name\": \"B\"}, {\"id\": \"c\", \"name\": \"C\"}], \"flows\": [{\"id\": \"f1\", \"from\": \"a\", \"to\": \"c\"}, {\"id\": \"f2\", \"from\": \"b\", \"to\": \"c\"}]}";
        let mock = Arc::new(MockLlmClient::new().with_fallback(reply));
        let (ctx, _rx) = test_support::context(mock);
        let update = Architect.run(&SessionState::new("x"), &ctx).await;

        assert_eq!(update.planned_flows.unwrap().len(), 2);
        assert_eq!(
            update.plan_issues,
            vec![PlanIssue::ConvergentFlows {
                screen_id: "c".into(),
                count: 2
            }]
        );
    }
}
