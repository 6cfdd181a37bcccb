//! Design-System Proposer：给出 5 种字体与 5 种风格供用户挑选
//!
//! 成功时只写入选项、不标记完成（等待用户选择）；失败时静默标记完成、不给选项。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::state::{DesignSystemOptions, FontOption, SessionState, VibeOption, AUTO_VIBE_ID};
use crate::core::update::StageUpdate;
use crate::parse::{parse_structured, StructuredResponse};
use crate::stages::{prompts, Stage, StageContext};

pub const MAX_FONTS: usize = 5;
pub const MAX_VIBES: usize = 5;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DesignSystemResponse {
    pub fonts: Vec<FontOption>,
    pub vibes: Vec<VibeOption>,
}

impl StructuredResponse for DesignSystemResponse {
    fn validate(&self) -> Result<(), String> {
        if self.fonts.is_empty() && self.vibes.is_empty() {
            return Err("no fonts or vibes proposed".to_string());
        }
        Ok(())
    }
}

/// 截断到上限、补齐 id，并在末尾追加「交给设计师决定」的 auto 风格
pub fn normalize_options(response: DesignSystemResponse) -> DesignSystemOptions {
    let fonts = response
        .fonts
        .into_iter()
        .take(MAX_FONTS)
        .enumerate()
        .map(|(i, mut font)| {
            if font.id.trim().is_empty() {
                font.id = format!("font-{}", i + 1);
            }
            font
        })
        .collect();

    let mut vibes: Vec<VibeOption> = response
        .vibes
        .into_iter()
        .filter(|v| v.id != AUTO_VIBE_ID)
        .take(MAX_VIBES)
        .enumerate()
        .map(|(i, mut vibe)| {
            if vibe.id.trim().is_empty() {
                vibe.id = format!("vibe-{}", i + 1);
            }
            vibe
        })
        .collect();
    vibes.push(auto_vibe());

    DesignSystemOptions { fonts, vibes }
}

pub fn auto_vibe() -> VibeOption {
    VibeOption {
        id: AUTO_VIBE_ID.to_string(),
        name: "Surprise me".to_string(),
        description: "Let the designer pick the mood for this product".to_string(),
        keywords: vec!["auto".to_string()],
        emoji: "✨".to_string(),
    }
}

fn complete_without_options() -> StageUpdate {
    StageUpdate {
        mark_design_system_complete: true,
        ..Default::default()
    }
}

pub struct DesignSystemProposer;

#[async_trait]
impl Stage for DesignSystemProposer {
    fn id(&self) -> StageId {
        StageId::DesignSystem
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate {
        if state.design_system_complete
            || state.selected_design_system.is_some()
            || state.has_plan_feedback()
            || state.design_approved
        {
            info!("Design system stage skipped");
            return complete_without_options();
        }

        let schema = prompts::response_schema::<DesignSystemResponse>();
        let prompt = prompts::design_system(state, &schema);
        let text = match ctx
            .invoke(
                &ctx.sink(self.id()),
                &prompt,
                ctx.settings.temperatures.design_system,
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Design system model call failed, skipping selection");
                return complete_without_options();
            }
        };

        match parse_structured::<DesignSystemResponse>(&text) {
            Ok(response) => {
                let options = normalize_options(response);
                info!(
                    fonts = options.fonts.len(),
                    vibes = options.vibes.len(),
                    "Design system options proposed"
                );
                StageUpdate {
                    design_system_options: Some(options),
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(error = %e, "Design system reply unparseable, skipping selection");
                complete_without_options()
            }
        }
    }
}
