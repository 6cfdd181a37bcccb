//! Clarifier：在规划之前追问至多几个选择题
//!
//! 澄清已完成、越过任一检查点、用户要求跳过、或问满上限时不调用模型。
//! 模型失败、解析失败、问题不合格都按「已就绪」处理，不阻塞管线。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::graph::StageId;
use crate::core::state::{Question, SessionState};
use crate::core::update::StageUpdate;
use crate::parse::{parse_structured, StructuredResponse};
use crate::stages::{prompts, Stage, StageContext};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClarifierResponse {
    pub ready: bool,
    #[serde(default)]
    pub question: Option<QuestionDraft>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QuestionDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl StructuredResponse for ClarifierResponse {}

/// 问题必须有文本和至少一个非空选项；缺 id 时用 q{index}
pub fn accept_question(draft: &QuestionDraft, question_index: usize) -> Option<Question> {
    let text = draft.text.trim();
    let options: Vec<String> = draft
        .options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect();
    if text.is_empty() || options.is_empty() {
        return None;
    }
    let id = draft
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("q{question_index}"));
    Some(Question {
        id,
        text: text.to_string(),
        options,
    })
}

fn ready(state: &SessionState) -> StageUpdate {
    StageUpdate {
        current_question: Some(None),
        clarification_complete: Some(true),
        enriched_request: Some(state.derive_enriched_request()),
        ..Default::default()
    }
}

pub struct Clarifier;

impl Clarifier {
    fn should_skip(state: &SessionState, max_questions: usize) -> bool {
        state.checkpoint_passed()
            || state.clarification_complete
            || state.skip_to_planning
            || state.qa_turns().count() >= max_questions
    }
}

#[async_trait]
impl Stage for Clarifier {
    fn id(&self) -> StageId {
        StageId::Clarifier
    }

    async fn run(&self, state: &SessionState, ctx: &StageContext) -> StageUpdate {
        let max_questions = ctx.settings.max_clarification_questions;
        if Self::should_skip(state, max_questions) {
            info!("Clarifier skipped");
            return ready(state);
        }

        let question_index = state.question_index();
        let schema = prompts::response_schema::<ClarifierResponse>();
        let prompt = prompts::clarifier(state, question_index, max_questions, &schema);

        let text = match ctx
            .invoke(&ctx.sink(self.id()), &prompt, ctx.settings.temperatures.clarifier)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Clarifier model call failed, continuing without questions");
                return ready(state);
            }
        };

        let response = match parse_structured::<ClarifierResponse>(&text) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Clarifier reply unparseable, continuing without questions");
                return ready(state);
            }
        };

        if response.ready {
            info!("Clarifier: request is ready");
            return ready(state);
        }
        match response
            .question
            .as_ref()
            .and_then(|draft| accept_question(draft, question_index))
        {
            Some(question) => {
                info!(question_id = %question.id, "Clarifier asks question {}", question_index);
                StageUpdate {
                    current_question: Some(Some(question)),
                    clarification_complete: Some(false),
                    ..Default::default()
                }
            }
            None => {
                warn!("Clarifier produced an invalid question, continuing without it");
                ready(state)
            }
        }
    }
}
