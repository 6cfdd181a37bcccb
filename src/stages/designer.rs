//! Designer：按 current_screen_index 合成单个屏幕（第一个屏幕缺失时先补它）；SaveScreen：合成之后的记账步骤
//!
//! 第一个屏幕定义设计系统并成为 reference_html，后续屏幕照着它做。
//! 已生成过的 id 直接返回已存 HTML，不再调用模型。失败时什么也不提交，下次恢复时重试。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::state::{PlannedScreen, SessionState};
use crate::core::update::{StageUpdate, SynthesizedScreen};
use crate::events::signal::TokenSink;
use crate::parse::clean_markup;
use crate::stages::{prompts, Stage, StageContext};

/// 合成一个屏幕；失败时 html 为空
pub async fn synthesize_screen(
    state: &SessionState,
    ctx: &StageContext,
    index: usize,
    screen: &PlannedScreen,
    sink: &TokenSink,
) -> SynthesizedScreen {
    if let Some(existing) = state.generated(&screen.id) {
        info!(screen_id = %screen.id, "Screen already generated, reusing stored markup");
        return SynthesizedScreen {
            index,
            id: screen.id.clone(),
            name: existing.name.clone(),
            html: existing.html.clone(),
            cached: true,
        };
    }

    let reference = Some(state.reference_html.as_str()).filter(|html| !html.trim().is_empty());
    let prompt = prompts::designer(state, index, screen, reference);

    let html = match ctx
        .invoke(sink, &prompt, ctx.settings.temperatures.designer)
        .await
    {
        Ok(text) => clean_markup(&text),
        Err(e) => {
            warn!(screen_id = %screen.id, error = %e, "Screen synthesis failed");
            String::new()
        }
    };

    SynthesizedScreen {
        index,
        id: screen.id.clone(),
        name: screen.name.clone(),
        html,
        cached: false,
    }
}

pub struct Designer;

#[async_trait]
impl Stage for Designer {
    fn id(&self) -> StageId {
        StageId::Designer
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate {
        let index = state.designer_screen_index();
        let Some(screen) = state.planned_screens.get(index) else {
            info!(index, "No planned screen at current index, nothing to design");
            return StageUpdate::default();
        };

        let sink = ctx.sink(self.id()).for_screen(&screen.id);
        let result = synthesize_screen(state, ctx, index, screen, &sink).await;

        if !result.succeeded() {
            return StageUpdate {
                synthesized: vec![result],
                ..Default::default()
            };
        }

        info!(
            screen_id = %result.id,
            bytes = result.html.len(),
            cached = result.cached,
            "Screen {} of {} designed",
            index + 1,
            state.planned_screens.len()
        );
        StageUpdate {
            reference_html: Some(result.html.clone()),
            current_screen_index: Some(index + 1),
            synthesized: vec![result],
            ..Default::default()
        }
    }
}

pub struct SaveScreen;

#[async_trait]
impl Stage for SaveScreen {
    fn id(&self) -> StageId {
        StageId::SaveScreen
    }

    async fn run(&self, state: &SessionState, _ctx: &StageContext) -> StageUpdate {
        info!(
            saved = state.generated_screens.len(),
            planned = state.planned_screens.len(),
            "Screen saved"
        );
        StageUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::GeneratedScreen;
    use crate::llm::MockLlmClient;
    use crate::stages::test_support;
    use std::sync::Arc;

    const PAGE_REPLY: &str = "Sure, here it is:\n```html\n<!DOCTYPE html>\n<html><body>home</body></html>\n```";

    fn planned_state() -> SessionState {
        let mut state = SessionState::new("a todo app");
        state.planned_screens = ["home", "list"]
            .iter()
            .map(|id| PlannedScreen {
                id: id.to_string(),
                name: id.to_uppercase(),
                description: String::new(),
            })
            .collect();
        state.design_approved = true;
        state
    }

    #[tokio::test]
    async fn test_first_screen_becomes_reference() {
        let mock = Arc::new(MockLlmClient::new().with_rule("Screen id: home", PAGE_REPLY));
        let (ctx, mut rx) = test_support::context(mock.clone());
        let state = planned_state();

        let update = Designer.run(&state, &ctx).await;
        let html = "<!DOCTYPE html>\n<html><body>home</body></html>";
        assert_eq!(update.reference_html.as_deref(), Some(html));
        assert_eq!(update.current_screen_index, Some(1));
        assert_eq!(update.synthesized[0].html, html);
        assert!(!mock.calls()[0].prompt.contains(prompts::REFERENCE_HEADER));

        let tokens = test_support::drain_tokens(&mut rx);
        assert!(tokens.iter().all(|(id, _)| id.as_deref() == Some("home")));
    }

    #[tokio::test]
    async fn test_generated_screen_is_not_regenerated() {
        let mock = Arc::new(MockLlmClient::new().with_fallback(PAGE_REPLY));
        let (ctx, _rx) = test_support::context(mock.clone());
        let mut state = planned_state();
        state.generated_screens.push(GeneratedScreen {
            id: "home".into(),
            name: "HOME".into(),
            html: "<html>stored</html>".into(),
        });

        let update = Designer.run(&state, &ctx).await;
        assert!(mock.calls().is_empty());
        assert!(update.synthesized[0].cached);
        assert_eq!(update.synthesized[0].html, "<html>stored</html>");
    }

    #[tokio::test]
    async fn test_failure_commits_nothing() {
        let (ctx, _rx) = test_support::context(Arc::new(MockLlmClient::new()));
        let mut state = planned_state();
        let update = Designer.run(&state, &ctx).await;

        assert!(update.current_screen_index.is_none());
        assert!(update.reference_html.is_none());
        assert_eq!(update.synthesized[0].html, "");

        state.apply(&update);
        assert!(state.generated_screens.is_empty());
        assert_eq!(state.current_screen_index, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_noop() {
        let mock = Arc::new(MockLlmClient::new().with_fallback(PAGE_REPLY));
        let (ctx, _rx) = test_support::context(mock.clone());
        let mut state = planned_state();
        state.generated_screens.push(GeneratedScreen {
            id: "home".into(),
            name: "HOME".into(),
            html: "<html>stored</html>".into(),
        });
        state.current_screen_index = 5;
        assert!(Designer.run(&state, &ctx).await.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry_screen_is_designed_first() {
        let mock = Arc::new(MockLlmClient::new().with_rule("Screen id: home", PAGE_REPLY));
        let (ctx, _rx) = test_support::context(mock.clone());
        let mut state = planned_state();
        state.generated_screens.push(GeneratedScreen {
            id: "list".into(),
            name: "LIST".into(),
            html: "<html>list</html>".into(),
        });
        state.current_screen_index = 2;

        let update = Designer.run(&state, &ctx).await;
        assert_eq!(update.synthesized[0].id, "home");
        assert_eq!(update.synthesized[0].index, 0);
        assert!(update.reference_html.is_some());
        assert_eq!(mock.calls_matching("Screen id: home"), 1);
    }
}
