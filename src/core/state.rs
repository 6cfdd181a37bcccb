//! 会话状态：一次生成运行的全部可序列化记录
//!
//! 状态随请求整体传入、随 done 事件整体返回；服务端不保存任何会话。
//! 阶段只读取 `&SessionState` 并产出 `StageUpdate`，由 Coordinator 统一合并（见 update.rs）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type ScreenId = String;

/// `selectedDesignSystem.vibe.id` 的哨兵值：不固定风格，由设计阶段自行决定
pub const AUTO_VIBE_ID: &str = "auto";

/// 对话历史中的一轮
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// 一问一答（澄清阶段）
    Qa { question: String, answer: String },
    /// 用户对计划提出的修改意见
    PlanFeedback { feedback: String },
}

/// 待回答的澄清问题（同一时刻至多一个）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FontOption {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// CSS font-family 写法
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub description: String,
}

/// 风格建议：只描述气质，不给具体颜色
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VibeOption {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub emoji: String,
}

impl VibeOption {
    pub fn is_auto(&self) -> bool {
        self.id == AUTO_VIBE_ID
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignSystemOptions {
    pub fonts: Vec<FontOption>,
    pub vibes: Vec<VibeOption>,
}

impl DesignSystemOptions {
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty() && self.vibes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedDesignSystem {
    pub font: FontOption,
    pub vibe: VibeOption,
}

/// 计划中的一个屏幕；id 是下游所有环节的关联键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedScreen {
    pub id: ScreenId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 屏幕之间的有向导航边
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Flow {
    #[serde(default)]
    pub id: String,
    pub from: ScreenId,
    pub to: ScreenId,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScreen {
    pub id: ScreenId,
    pub name: String,
    pub html: String,
}

/// 一次生成运行的完整状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub user_request: String,
    pub conversation_history: Vec<Turn>,
    pub current_question: Option<Question>,
    pub clarification_complete: bool,
    pub enriched_request: String,
    pub design_system_options: Option<DesignSystemOptions>,
    pub selected_design_system: Option<SelectedDesignSystem>,
    pub design_system_complete: bool,
    pub design_approved: bool,
    pub skip_to_planning: bool,
    pub plan_feedback: String,
    pub planned_screens: Vec<PlannedScreen>,
    pub planned_flows: Vec<Flow>,
    pub current_screen_index: usize,
    pub reference_html: String,
    pub generated_screens: Vec<GeneratedScreen>,
}

impl SessionState {
    /// 全新对话：只有原始请求
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            ..Self::default()
        }
    }

    /// 所有问答轮次 (question, answer)
    pub fn qa_turns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conversation_history.iter().filter_map(|t| match t {
            Turn::Qa { question, answer } => Some((question.as_str(), answer.as_str())),
            Turn::PlanFeedback { .. } => None,
        })
    }

    /// UI 用的问题序号：已回答轮数 + 1
    pub fn question_index(&self) -> usize {
        self.qa_turns().count() + 1
    }

    pub fn has_plan_feedback(&self) -> bool {
        !self.plan_feedback.trim().is_empty()
    }

    /// 「已经越过这个检查点」的统一判断：设计系统已定、计划被要求修改、或计划已批准
    pub fn checkpoint_passed(&self) -> bool {
        self.design_system_complete || self.has_plan_feedback() || self.design_approved
    }

    /// 恢复模式：已有部分屏幕产出
    pub fn is_resume_mode(&self) -> bool {
        self.current_screen_index > 0 || !self.generated_screens.is_empty()
    }

    pub fn has_plan(&self) -> bool {
        !self.planned_screens.is_empty()
    }

    pub fn generated(&self, id: &str) -> Option<&GeneratedScreen> {
        self.generated_screens.iter().find(|s| s.id == id)
    }

    /// 计划中的第一个屏幕已生成；其余屏幕都以它为参照
    pub fn entry_screen_generated(&self) -> bool {
        self.planned_screens
            .first()
            .is_some_and(|entry| self.generated(&entry.id).is_some())
    }

    /// Designer 要合成的下标：第一个屏幕缺失时总是先补它
    pub fn designer_screen_index(&self) -> usize {
        if self.entry_screen_generated() {
            self.current_screen_index
        } else {
            0
        }
    }

    /// 后续阶段使用的需求文本：优先 enriched_request
    pub fn effective_request(&self) -> &str {
        if self.enriched_request.trim().is_empty() {
            &self.user_request
        } else {
            &self.enriched_request
        }
    }

    /// 原始请求 + 全部问答摘要；没有问答时等于原始请求
    pub fn derive_enriched_request(&self) -> String {
        let mut digest = String::new();
        for (question, answer) in self.qa_turns() {
            digest.push_str(&format!("\n- {} → {}", question.trim(), answer.trim()));
        }
        if digest.is_empty() {
            self.user_request.clone()
        } else {
            format!("{}\n\nClarifications:{}", self.user_request, digest)
        }
    }

    /// 并行阶段要生成的屏幕：下标 ≥ 1 且尚未生成，附带在计划中的下标
    pub fn pending_parallel_screens(&self) -> Vec<(usize, &PlannedScreen)> {
        self.planned_screens
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, s)| self.generated(&s.id).is_none())
            .collect()
    }

    /// 从 `from` 出发的导航边
    pub fn outgoing_flows<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Flow> + 'a {
        self.planned_flows.iter().filter(move |f| f.from == from)
    }
}

/// 单轮入站请求；除 prompt 外均可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub conversation_history: Vec<Turn>,
    pub planned_screens: Vec<PlannedScreen>,
    pub planned_flows: Vec<Flow>,
    pub skip_to_planning: bool,
    pub design_approved: bool,
    pub plan_feedback: String,
    pub generated_screens: Vec<GeneratedScreen>,
    pub design_system_options: Option<DesignSystemOptions>,
    pub selected_design_system: Option<SelectedDesignSystem>,
    pub design_system_complete: bool,
    /// 以下字段允许客户端原样回传上一轮的 done.state
    pub clarification_complete: Option<bool>,
    pub enriched_request: Option<String>,
    pub reference_html: Option<String>,
    pub current_screen_index: Option<usize>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// 转成本轮的起始状态；缺省的恢复信息从 generated_screens 推导
    pub fn into_state(self) -> SessionState {
        let mut state = SessionState {
            user_request: self.prompt.trim().to_string(),
            conversation_history: self.conversation_history,
            design_system_options: self.design_system_options,
            selected_design_system: self.selected_design_system,
            design_system_complete: self.design_system_complete,
            design_approved: self.design_approved,
            skip_to_planning: self.skip_to_planning,
            plan_feedback: self.plan_feedback,
            planned_screens: self.planned_screens,
            planned_flows: self.planned_flows,
            generated_screens: self.generated_screens,
            clarification_complete: self.clarification_complete.unwrap_or(false),
            enriched_request: self.enriched_request.unwrap_or_default(),
            reference_html: self.reference_html.unwrap_or_default(),
            current_screen_index: self.current_screen_index.unwrap_or(0),
            ..SessionState::default()
        };

        let first_html = state
            .planned_screens
            .first()
            .and_then(|first| state.generated(&first.id))
            .map(|g| g.html.clone());
        if let Some(html) = first_html {
            if state.reference_html.is_empty() {
                state.reference_html = html;
            }
            state.current_screen_index = state.current_screen_index.max(1);
        }
        state
    }
}
