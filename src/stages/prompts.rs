//! 各阶段的 Prompt 模板
//!
//! 每个 Prompt 第一行是任务标记（`TASK: ...`），便于日志检索与 Mock 脚本匹配。
//! 结构化回复的格式用 schemars 生成的 JSON Schema 描述。

use schemars::JsonSchema;

use crate::core::state::{PlannedScreen, SelectedDesignSystem, SessionState};

pub const CLARIFIER_TASK: &str = "TASK: clarify-requirements";
pub const DESIGN_SYSTEM_TASK: &str = "TASK: propose-design-system";
pub const ARCHITECT_TASK: &str = "TASK: plan-screens";
pub const DESIGNER_TASK: &str = "TASK: design-screen";

/// 计划修订 Prompt 的小节标题
pub const REVISION_HEADER: &str = "## Revision request";
/// 跟随参考屏幕 Prompt 的小节标题
pub const REFERENCE_HEADER: &str = "## Reference screen";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a senior product designer and front-end engineer. \
You turn short product ideas into concrete, buildable mobile-first UI screens. \
When asked for structured output, reply with a single JSON object in a ```json fenced block. \
You may think out loud first inside <thinking>...</thinking>; keep it short.";

/// 类型 T 的 JSON Schema（嵌入 Prompt）
pub fn response_schema<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn qa_transcript(state: &SessionState) -> String {
    let lines: Vec<String> = state
        .qa_turns()
        .map(|(q, a)| format!("Q: {}\nA: {}", q.trim(), a.trim()))
        .collect();
    if lines.is_empty() {
        "(none yet)".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn clarifier(state: &SessionState, question_index: usize, max_questions: usize, schema: &str) -> String {
    format!(
        "{CLARIFIER_TASK}\n\n\
## Product idea\n{request}\n\n\
## Answers so far\n{transcript}\n\n\
## Instructions\n\
Decide whether the idea is specific enough to plan its screens. \
This would be question {question_index} of at most {max_questions}. \
If something important is still unknown (audience, platform, core feature), ask ONE multiple-choice question \
with 2-4 short options: {{\"ready\": false, \"question\": {{\"id\": \"q{question_index}\", \"text\": \"...\", \"options\": [\"...\"]}}}}. \
Otherwise answer {{\"ready\": true, \"summary\": \"...\"}}. Never repeat a question that was already answered.\n\n\
Start with a brief <thinking> section, then the JSON.\n\n\
## Response schema\n{schema}\n",
        request = state.user_request,
        transcript = qa_transcript(state),
    )
}

pub fn design_system(state: &SessionState, schema: &str) -> String {
    format!(
        "{DESIGN_SYSTEM_TASK}\n\n\
## Product\n{request}\n\n\
## Instructions\n\
Propose exactly 5 font choices and exactly 5 visual vibes that fit this product.\n\
- Each font: name, CSS font-family with fallbacks, one-line description.\n\
- Each vibe: name, one-line description, 3-5 keywords, one emoji.\n\
- Describe vibes by mood only. Do not mention specific colors or hex values.\n\n\
Start with a brief <thinking> section, then the JSON.\n\n\
## Response schema\n{schema}\n",
        request = state.effective_request(),
    )
}

fn plan_rules() -> &'static str {
    "Plan rules:\n\
- The first screen is the entry point of the app.\n\
- Screens form a tree: every flow goes forward to a screen listed later than its source.\n\
- No two flows may target the same screen, and no flow may target the first screen.\n\
- Screen ids are short kebab-case slugs and unique."
}

pub fn architect(state: &SessionState, schema: &str) -> String {
    format!(
        "{ARCHITECT_TASK}\n\n\
## Product\n{request}\n\n\
## Instructions\n\
Plan the screens of a complete but focused first version, and the navigation flows between them.\n\
{rules}\n\n\
Start with a brief <thinking> section, then the JSON.\n\n\
## Response schema\n{schema}\n",
        request = state.effective_request(),
        rules = plan_rules(),
    )
}

pub fn architect_revision(state: &SessionState, schema: &str) -> String {
    let current = serde_json::json!({
        "screens": state.planned_screens,
        "flows": state.planned_flows,
    });
    let current = serde_json::to_string_pretty(&current).unwrap_or_default();
    format!(
        "{ARCHITECT_TASK}\n\n\
## Product\n{request}\n\n\
## Current plan\n```json\n{current}\n```\n\n\
{REVISION_HEADER}\n{feedback}\n\n\
## Instructions\n\
Revise the current plan so that it follows the revision request exactly. \
If the request names a number of screens, return exactly that many, even if the app would feel incomplete. \
Keep the ids of screens that survive unchanged.\n\
{rules}\n\n\
Start with a brief <thinking> section, then the JSON.\n\n\
## Response schema\n{schema}\n",
        request = state.effective_request(),
        feedback = state.plan_feedback.trim(),
        rules = plan_rules(),
    )
}

/// 用户选定的设计系统，作为强制约束注入；vibe 为 auto 时只约束字体
pub fn design_system_instruction(selected: &SelectedDesignSystem) -> String {
    let font = format!(
        "- Font (mandatory): {} ({}). Use it for all text.",
        selected.font.name,
        if selected.font.family.is_empty() {
            selected.font.name.as_str()
        } else {
            selected.font.family.as_str()
        }
    );
    let vibe = if selected.vibe.is_auto() {
        "- Vibe: your choice. You have full creative freedom over mood, palette and decoration.".to_string()
    } else {
        format!(
            "- Vibe (mandatory): {} {}: {}. Keywords: {}.",
            selected.vibe.emoji,
            selected.vibe.name,
            selected.vibe.description,
            selected.vibe.keywords.join(", ")
        )
    };
    format!("## Design system\n{font}\n{vibe}")
}

pub fn designer(
    state: &SessionState,
    index: usize,
    screen: &PlannedScreen,
    reference: Option<&str>,
) -> String {
    let screen_list: Vec<String> = state
        .planned_screens
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {} ({}): {}", i + 1, s.name, s.id, s.description))
        .collect();

    let links: Vec<String> = state
        .outgoing_flows(&screen.id)
        .map(|f| {
            let target = state
                .planned_screens
                .iter()
                .find(|s| s.id == f.to)
                .map(|s| s.name.as_str())
                .unwrap_or(f.to.as_str());
            format!("- \"{}\" leads to {} ({})", f.label, target, f.to)
        })
        .collect();
    let links = if links.is_empty() {
        "(no outgoing navigation)".to_string()
    } else {
        links.join("\n")
    };

    let design_system = state
        .selected_design_system
        .as_ref()
        .map(design_system_instruction)
        .unwrap_or_default();

    let variant = match reference {
        None => "This is the first screen. It defines the design system for the whole app: \
choose the palette, typography scale, spacing, component shapes and icon style deliberately, \
because every other screen will copy them."
            .to_string(),
        Some(html) => format!(
            "{REFERENCE_HEADER}\nCopy the reference screen's palette, typography, spacing, component shapes \
and icon style verbatim. Change only the content and layout needed for this screen.\n```html\n{html}\n```"
        ),
    };

    format!(
        "{DESIGNER_TASK}\n\n\
## Product\n{request}\n\n\
## All screens\n{screens}\n\n\
## This screen\nScreen id: {id}\nName: {name}\nPosition: {position} of {total}\nPurpose: {description}\n\n\
## Navigation from this screen\n{links}\n\n\
{design_system}\n\n\
{variant}\n\n\
## Output\nReturn one complete, self-contained HTML document (inline CSS, no external scripts) \
starting with <!DOCTYPE html>. Label every navigation element with its target screen.\n",
        request = state.effective_request(),
        screens = screen_list.join("\n"),
        id = screen.id,
        name = screen.name,
        position = index + 1,
        total = state.planned_screens.len(),
        description = screen.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{FontOption, VibeOption, AUTO_VIBE_ID};

    fn selected(vibe_id: &str) -> SelectedDesignSystem {
        SelectedDesignSystem {
            font: FontOption {
                id: "font-1".into(),
                name: "Inter".into(),
                family: "Inter, sans-serif".into(),
                description: String::new(),
            },
            vibe: VibeOption {
                id: vibe_id.into(),
                name: "Calm".into(),
                description: "Soft".into(),
                keywords: vec!["airy".into()],
                emoji: "🌿".into(),
            },
        }
    }

    #[test]
    fn test_auto_vibe_relaxes_only_vibe() {
        let text = design_system_instruction(&selected(AUTO_VIBE_ID));
        assert!(text.contains("Font (mandatory): Inter"));
        assert!(text.contains("full creative freedom"));
        assert!(!text.contains("Vibe (mandatory)"));

        let text = design_system_instruction(&selected("vibe-1"));
        assert!(text.contains("Vibe (mandatory)"));
    }

    #[test]
    fn test_designer_variants() {
        let mut state = SessionState::new("a todo app");
        state.planned_screens = vec![PlannedScreen {
            id: "home".into(),
            name: "Home".into(),
            description: "Lists".into(),
        }];
        let first = designer(&state, 0, &state.planned_screens[0], None);
        assert!(first.starts_with(DESIGNER_TASK));
        assert!(first.contains("Screen id: home"));
        assert!(!first.contains(REFERENCE_HEADER));

        let follow = designer(&state, 0, &state.planned_screens[0], Some("<html>ref</html>"));
        assert!(follow.contains(REFERENCE_HEADER));
        assert!(follow.contains("<html>ref</html>"));
    }
}
