//! 管线集成测试：用脚本化 Mock 后端跑完整的多轮对话

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use screenloom::config::PipelineSection;
use screenloom::core::{
    Awaiting, GenerateRequest, GeneratedScreen, PipelineError, PlannedScreen, RunStatus,
    SelectedDesignSystem, SessionState, Turn,
};
use screenloom::events::{ClientEvent, StepName, StepStatus};
use screenloom::llm::{
    flatten_messages, GenerationOptions, LlmClient, LlmError, Message, MockLlmClient,
    TokenStream,
};
use screenloom::runtime::Pipeline;
use screenloom::stages::prompts;

const CLARIFIER_READY: &str =
    "<thinking>We know the audience now.</thinking>\n```json\n{\"ready\": true, \"summary\": \"todo app for students\"}\n```";

const THREE_SCREEN_PLAN: &str = "<thinking>Home, list and detail.</thinking>\n```json\n{\"screens\": [\
{\"id\": \"home\", \"name\": \"Home\", \"description\": \"Overview\"}, \
{\"id\": \"list\", \"name\": \"List\", \"description\": \"All todos\"}, \
{\"id\": \"detail\", \"name\": \"Detail\", \"description\": \"One todo\"}], \
\"flows\": [{\"id\": \"f1\", \"from\": \"home\", \"to\": \"list\", \"label\": \"See all\"}, \
{\"id\": \"f2\", \"from\": \"list\", \"to\": \"detail\", \"label\": \"Open\"}]}\n```";

fn page(name: &str) -> String {
    format!(
        "Here is code:\n```html\n<!DOCTYPE html>\n<html><head><title>{name}</title></head><body><h1>{name}</h1></body></html>\n```"
    )
}

fn scripted_backend() -> Arc<MockLlmClient> {
    Arc::new(
        MockLlmClient::new()
            .with_rule(prompts::CLARIFIER_TASK, CLARIFIER_READY)
            .with_rule(prompts::ARCHITECT_TASK, THREE_SCREEN_PLAN)
            .with_rule("Screen id: home", page("Home"))
            .with_rule("Screen id: list", page("List"))
            .with_rule("Screen id: detail", page("Detail"))
            .with_chunk_chars(7),
    )
}

const DESIGN_OPTIONS: &str = "```json\n{\"fonts\": [{\"name\": \"Inter\", \"family\": \"Inter, sans-serif\"}], \
\"vibes\": [{\"name\": \"Calm\", \"description\": \"Soft\", \"keywords\": [\"airy\"], \"emoji\": \"🌿\"}]}\n```";

/// 把上一轮 done.state 原样回传成下一轮请求
fn echo(state: &SessionState) -> GenerateRequest {
    let mut value = serde_json::to_value(state).unwrap();
    value["prompt"] = state.user_request.clone().into();
    serde_json::from_value(value).unwrap()
}

fn approved_three_screen_request() -> GenerateRequest {
    let mut req = GenerateRequest::new("a todo app");
    req.design_approved = true;
    req.design_system_complete = true;
    req.planned_screens = vec![
        screen("home", "Home"),
        screen("list", "List"),
        screen("detail", "Detail"),
    ];
    req
}

fn screen(id: &str, name: &str) -> PlannedScreen {
    PlannedScreen {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
    }
}

/// 按顺序检查 needles 是 events 的子序列
fn assert_subsequence(events: &[ClientEvent], needles: &[&dyn Fn(&ClientEvent) -> bool]) {
    let mut it = events.iter();
    for (i, needle) in needles.iter().enumerate() {
        assert!(
            it.any(|e| needle(e)),
            "expected event #{i} not found in order; events: {:?}",
            events.iter().map(|e| e.kind()).collect::<Vec<_>>()
        );
    }
}

fn is_step(name: StepName, status: StepStatus) -> impl Fn(&ClientEvent) -> bool {
    move |e| matches!(e, ClientEvent::Step { name: n, status: s, .. } if *n == name && *s == status)
}

#[tokio::test]
async fn test_plan_then_approve_generates_all_screens() {
    let llm = scripted_backend();
    let pipeline = Pipeline::with_llm(llm.clone(), PipelineSection::default());

    // 第一轮：已回答一个问题，规划后等待批准
    let mut first = GenerateRequest::new("a todo app");
    first.conversation_history.push(Turn::Qa {
        question: "Who is it for?".into(),
        answer: "Students".into(),
    });
    let (events, outcome) = pipeline.run_to_completion(first).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Halted(Awaiting::PlanApproval));
    assert!(matches!(events[0], ClientEvent::RunStarted { .. }));
    assert_subsequence(
        &events,
        &[
            &is_step(StepName::Clarifying, StepStatus::Started),
            &is_step(StepName::Clarifying, StepStatus::Completed),
            &|e: &ClientEvent| matches!(e, ClientEvent::Plan { screens } if screens.len() == 3),
            &|e: &ClientEvent| matches!(e, ClientEvent::Flows { flows } if flows.len() == 2),
            &|e: &ClientEvent| matches!(e, ClientEvent::PlanReady { screen_count: 3, flow_count: 2, issues } if issues.is_empty()),
            &|e: &ClientEvent| matches!(e, ClientEvent::Done { awaiting: Some(Awaiting::PlanApproval), .. }),
        ],
    );
    let thoughts: String = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Thought { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(thoughts, "We know the audience now.Home, list and detail.");
    assert!(outcome.state.enriched_request.contains("Students"));

    // 第二轮：批准计划
    let state = outcome.state;
    let mut second = GenerateRequest::new("a todo app");
    second.conversation_history = state.conversation_history.clone();
    second.planned_screens = state.planned_screens.clone();
    second.planned_flows = state.planned_flows.clone();
    second.design_system_complete = state.design_system_complete;
    second.enriched_request = Some(state.enriched_request.clone());
    second.design_approved = true;

    let (events, outcome) = pipeline.run_to_completion(second).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);

    assert_subsequence(
        &events,
        &[
            &|e: &ClientEvent| matches!(e, ClientEvent::ScreenStart { screen_id, screen_index: 0, .. } if screen_id == "home"),
            &|e: &ClientEvent| matches!(e, ClientEvent::CodeChunk { screen_id, .. } if screen_id == "home"),
            &|e: &ClientEvent| matches!(e, ClientEvent::ScreenComplete { screen_index: 0, .. }),
            &|e: &ClientEvent| matches!(e, ClientEvent::ParallelScreensStart { screens } if screens.len() == 2),
            &|e: &ClientEvent| matches!(e, ClientEvent::ParallelScreensComplete { screens } if screens.len() == 2),
            &|e: &ClientEvent| matches!(e, ClientEvent::Done { awaiting: None, .. }),
        ],
    );

    // 每个屏幕的第一个片段恰好从文档起点开始，拼接后与清洗结果一致
    for id in ["home", "list", "detail"] {
        let chunks: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::CodeChunk { screen_id, content } if screen_id == id => {
                    Some(content.as_str())
                }
                _ => None,
            })
            .collect();
        assert!(!chunks.is_empty(), "no code chunks for {id}");
        assert!(chunks[0].starts_with("<!DOCTYPE"), "first chunk for {id}: {:?}", chunks[0]);
        assert!(chunks.concat().contains("</html>"));
    }

    let ids: Vec<&str> = outcome
        .state
        .generated_screens
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(ids, vec!["home", "list", "detail"]);
    assert!(outcome.state.reference_html.contains("<h1>Home</h1>"));
    assert_eq!(outcome.state.current_screen_index, 3);
    // 批准后的计划不再调用 Architect
    assert_eq!(llm.calls_matching(prompts::ARCHITECT_TASK), 1);
}

#[tokio::test]
async fn test_resume_skips_generated_screens() {
    let llm = scripted_backend();
    let pipeline = Pipeline::with_llm(llm.clone(), PipelineSection::default());

    let mut req = GenerateRequest::new("a todo app");
    req.design_approved = true;
    req.planned_screens = vec![
        screen("home", "Home"),
        screen("list", "List"),
        screen("detail", "Detail"),
    ];
    req.generated_screens = vec![
        GeneratedScreen {
            id: "home".into(),
            name: "Home".into(),
            html: "<html>stored home</html>".into(),
        },
        GeneratedScreen {
            id: "detail".into(),
            name: "Detail".into(),
            html: "<html>stored detail</html>".into(),
        },
    ];

    let (events, outcome) = pipeline.run_to_completion(req).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(llm.calls_matching(prompts::DESIGNER_TASK), 1);
    assert_eq!(llm.calls_matching("Screen id: list"), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, ClientEvent::ScreenStart { .. })));

    let state = outcome.state;
    assert_eq!(state.reference_html, "<html>stored home</html>");
    assert_eq!(state.generated_screens.len(), 3);
    assert_eq!(state.generated("detail").unwrap().html, "<html>stored detail</html>");
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let pipeline = Pipeline::with_llm(scripted_backend(), PipelineSection::default());
    let err = pipeline
        .start_run(GenerateRequest::new("   "))
        .await
        .err()
        .unwrap();
    assert_eq!(err, PipelineError::EmptyPrompt);
}

/// 先吐一个片段，然后永远不结束
struct StallingClient;

#[async_trait]
impl LlmClient for StallingClient {
    async fn complete(&self, _: &[Message], _: &GenerationOptions) -> Result<String, LlmError> {
        futures_util::future::pending().await
    }

    async fn complete_stream(
        &self,
        _: &[Message],
        _: &GenerationOptions,
    ) -> Result<TokenStream, LlmError> {
        let first = stream::iter(vec![Ok("<thinking>hmm".to_string())]);
        Ok(Box::pin(futures_util::StreamExt::chain(first, stream::pending())))
    }
}

#[tokio::test]
async fn test_cancel_pauses_running_step() {
    let pipeline = Pipeline::with_llm(Arc::new(StallingClient), PipelineSection::default());
    let handle = pipeline
        .start_run(GenerateRequest::new("a todo app"))
        .await
        .unwrap();
    let run_id = handle.run_id.clone();
    let (mut events, join) = handle.split();

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let is_thought = matches!(event, ClientEvent::Thought { .. });
        seen.push(event);
        if is_thought {
            assert!(pipeline.supervisor().cancel(&run_id).await);
        }
    }

    let outcome = tokio::time::timeout(Duration::from_secs(5), join.join())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome.status, RunStatus::Cancelled { .. }));
    assert_eq!(
        seen.last(),
        Some(&ClientEvent::step(StepName::Clarifying, StepStatus::Paused))
    );
    assert_eq!(pipeline.supervisor().active_runs().await, 0);
}

#[tokio::test]
async fn test_client_disconnect_cancels_run() {
    let pipeline = Pipeline::with_llm(Arc::new(StallingClient), PipelineSection::default());
    let handle = pipeline
        .start_run(GenerateRequest::new("a todo app"))
        .await
        .unwrap();
    let (events, join) = handle.split();
    drop(events);

    let outcome = tokio::time::timeout(Duration::from_secs(5), join.join())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome.status, RunStatus::Cancelled { .. }));
}

/// 记录同时进行中的流式调用数的峰值
struct ConcurrencyTracker {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmClient for ConcurrencyTracker {
    async fn complete(&self, _: &[Message], _: &GenerationOptions) -> Result<String, LlmError> {
        Ok("<html>s</html>".to_string())
    }

    async fn complete_stream(
        &self,
        _: &[Message],
        _: &GenerationOptions,
    ) -> Result<TokenStream, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        Ok(Box::pin(stream::once(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("<html>s</html>".to_string())
        })))
    }
}

#[tokio::test]
async fn test_parallel_fan_out_is_bounded() {
    let peak = Arc::new(AtomicUsize::new(0));
    let tracker = ConcurrencyTracker {
        in_flight: Arc::new(AtomicUsize::new(0)),
        peak: peak.clone(),
    };
    let settings = PipelineSection {
        max_parallel_screens: 2,
        ..PipelineSection::default()
    };
    let pipeline = Pipeline::with_llm(Arc::new(tracker), settings);

    let mut req = GenerateRequest::new("a todo app");
    req.design_approved = true;
    req.planned_screens = (0..6).map(|i| screen(&format!("s{i}"), &format!("S{i}"))).collect();
    req.generated_screens = vec![GeneratedScreen {
        id: "s0".into(),
        name: "S0".into(),
        html: "<html>s0</html>".into(),
    }];

    let (_, outcome) = pipeline.run_to_completion(req).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(outcome.state.generated_screens.len(), 6);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_first_screen_is_retried_on_next_turn() {
    let failing = Arc::new(
        MockLlmClient::new()
            .with_failure("Screen id: home")
            .with_fallback(page("Other")),
    );
    let pipeline = Pipeline::with_llm(failing.clone(), PipelineSection::default());

    let (events, outcome) = pipeline
        .run_to_completion(approved_three_screen_request())
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    assert!(outcome.state.generated_screens.is_empty());
    assert!(outcome.state.reference_html.is_empty());
    assert_eq!(failing.calls().len(), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ScreenComplete { screen_index: 0, html, .. } if html.is_empty()
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ClientEvent::ParallelScreensStart { .. })));

    // 下一轮：同一状态、可用的模型
    let llm = scripted_backend();
    let pipeline = Pipeline::with_llm(llm.clone(), PipelineSection::default());
    let (_, outcome) = pipeline.run_to_completion(echo(&outcome.state)).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    let ids: Vec<&str> = outcome
        .state
        .generated_screens
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(ids, vec!["home", "list", "detail"]);
    assert!(outcome.state.reference_html.contains("<h1>Home</h1>"));
    assert_eq!(llm.calls_matching("Screen id: home"), 1);
}

#[tokio::test]
async fn test_resume_without_entry_screen_designs_it_first() {
    let llm = scripted_backend();
    let pipeline = Pipeline::with_llm(llm.clone(), PipelineSection::default());

    let mut req = approved_three_screen_request();
    req.current_screen_index = Some(3);
    req.generated_screens = vec![
        GeneratedScreen {
            id: "list".into(),
            name: "List".into(),
            html: "<html>stored list</html>".into(),
        },
        GeneratedScreen {
            id: "detail".into(),
            name: "Detail".into(),
            html: "<html>stored detail</html>".into(),
        },
    ];

    let (events, outcome) = pipeline.run_to_completion(req).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(llm.calls_matching(prompts::DESIGNER_TASK), 1);
    assert_eq!(llm.calls_matching("Screen id: home"), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ScreenStart { screen_id, screen_index: 0, .. } if screen_id == "home"
    )));
    assert!(outcome.state.generated("home").is_some());
    assert_eq!(outcome.state.generated_screens.len(), 3);
    assert!(outcome.state.reference_html.contains("<h1>Home</h1>"));
}

/// detail 屏幕的调用永远不结束，其余屏幕立即返回
struct StallOnDetail;

#[async_trait]
impl LlmClient for StallOnDetail {
    async fn complete(&self, _: &[Message], _: &GenerationOptions) -> Result<String, LlmError> {
        futures_util::future::pending().await
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _: &GenerationOptions,
    ) -> Result<TokenStream, LlmError> {
        if flatten_messages(messages).contains("Screen id: detail") {
            return Ok(Box::pin(stream::pending()));
        }
        Ok(Box::pin(stream::iter(vec![Ok(
            "<!DOCTYPE html><html>done</html>".to_string()
        )])))
    }
}

#[tokio::test]
async fn test_cancel_during_parallel_keeps_finished_screens() {
    let pipeline = Pipeline::with_llm(Arc::new(StallOnDetail), PipelineSection::default());
    let mut req = approved_three_screen_request();
    req.generated_screens = vec![GeneratedScreen {
        id: "home".into(),
        name: "Home".into(),
        html: "<html>home</html>".into(),
    }];

    let handle = pipeline.start_run(req).await.unwrap();
    let (mut events, join) = handle.split();
    let cancel = join.cancel.clone();

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let list_done = matches!(
            &event,
            ClientEvent::CodeChunk { screen_id, content } if screen_id == "list" && content.contains("</html>")
        );
        seen.push(event);
        if list_done {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        }
    }

    let outcome = tokio::time::timeout(Duration::from_secs(5), join.join())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome.status, RunStatus::Cancelled { .. }));
    let ids: Vec<&str> = outcome
        .state
        .generated_screens
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(ids, vec!["home", "list"]);

    assert_subsequence(
        &seen,
        &[
            &|e: &ClientEvent| matches!(e, ClientEvent::ParallelScreensStart { screens } if screens.len() == 2),
            &|e: &ClientEvent| matches!(e, ClientEvent::ScreenComplete { screen_id, html, .. } if screen_id == "list" && html.contains("done")),
            &is_step(StepName::ParallelDesigning, StepStatus::Paused),
        ],
    );
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ClientEvent::ParallelScreensComplete { .. })));
}

#[tokio::test]
async fn test_design_selection_is_enforced_in_screens() {
    let llm = Arc::new(
        MockLlmClient::new()
            .with_rule(prompts::CLARIFIER_TASK, CLARIFIER_READY)
            .with_rule(prompts::DESIGN_SYSTEM_TASK, DESIGN_OPTIONS)
            .with_rule(prompts::ARCHITECT_TASK, THREE_SCREEN_PLAN)
            .with_rule("Screen id: home", page("Home"))
            .with_rule("Screen id: list", page("List"))
            .with_rule("Screen id: detail", page("Detail")),
    );
    let pipeline = Pipeline::with_llm(llm.clone(), PipelineSection::default());

    // 第一轮：澄清就绪，停在字体/风格选择
    let (events, outcome) = pipeline
        .run_to_completion(GenerateRequest::new("a todo app"))
        .await
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Halted(Awaiting::DesignSelection));
    assert!(outcome.state.clarification_complete);
    let options = outcome.state.design_system_options.clone().unwrap();
    assert_eq!(options.fonts[0].name, "Inter");
    assert!(options.vibes.iter().any(|v| v.is_auto()));
    assert!(events.iter().any(|e| matches!(e, ClientEvent::DesignSystemOptions { .. })));

    // 第二轮：带上选择，澄清不再调用模型，停在计划批准
    let mut second = echo(&outcome.state);
    second.selected_design_system = Some(SelectedDesignSystem {
        font: options.fonts[0].clone(),
        vibe: options.vibes[0].clone(),
    });
    let (_, outcome) = pipeline.run_to_completion(second).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Halted(Awaiting::PlanApproval));
    assert_eq!(llm.calls_matching(prompts::CLARIFIER_TASK), 1);
    assert_eq!(llm.calls_matching(prompts::DESIGN_SYSTEM_TASK), 1);

    // 第三轮：批准计划，每个屏幕的提示都带上选定的字体与风格
    let mut third = echo(&outcome.state);
    third.design_approved = true;
    let (_, outcome) = pipeline.run_to_completion(third).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(outcome.state.generated_screens.len(), 3);

    let designer_calls: Vec<_> = llm
        .calls()
        .into_iter()
        .filter(|c| c.prompt.contains(prompts::DESIGNER_TASK))
        .collect();
    assert_eq!(designer_calls.len(), 3);
    for call in designer_calls {
        assert!(call.prompt.contains("Font (mandatory): Inter (Inter, sans-serif)"));
        assert!(call.prompt.contains("Vibe (mandatory): 🌿 Calm"));
    }
}
