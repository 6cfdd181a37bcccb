//! Headless 运行时
//!
//! 供命令行与 HTTP 前端共用：Pipeline 持有 LLM 后端、管线参数与运行登记表，
//! start_run 对单个请求启动一次运行，返回 RunHandle（事件接收端 + 取消令牌 + 结果句柄）。
//! 每次运行两个任务：Coordinator 与事件翻译 pump。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{AppConfig, PipelineSection};
use crate::core::coordinator::{Coordinator, RunOutcome};
use crate::core::error::PipelineError;
use crate::core::run_supervisor::RunSupervisor;
use crate::core::state::GenerateRequest;
use crate::core::task_scheduler::TaskScheduler;
use crate::events::{pump, ClientEvent, ExecSignal};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::stages::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::stages::StageContext;

const SIGNAL_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// 一次运行的句柄
pub struct RunHandle {
    pub run_id: String,
    pub events: mpsc::Receiver<ClientEvent>,
    pub cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, PipelineError>>,
}

impl RunHandle {
    /// 等待运行结束
    pub async fn join(self) -> Result<RunOutcome, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    }

    /// 拆成事件接收端与结果句柄，便于分别交给不同任务
    pub fn split(self) -> (mpsc::Receiver<ClientEvent>, RunJoin) {
        (
            self.events,
            RunJoin {
                run_id: self.run_id,
                cancel: self.cancel,
                task: self.task,
            },
        )
    }
}

/// RunHandle 去掉事件接收端后的部分
pub struct RunJoin {
    pub run_id: String,
    pub cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, PipelineError>>,
}

impl RunJoin {
    pub async fn join(self) -> Result<RunOutcome, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    }
}

/// 预构建的管线：可在多次运行间共享
#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    settings: PipelineSection,
    system_prompt: String,
    coordinator: Arc<Coordinator>,
    supervisor: RunSupervisor,
}

impl Pipeline {
    /// 按配置创建（LLM 后端由 provider 与环境变量决定）
    pub fn from_config(cfg: &AppConfig) -> Self {
        let llm = create_llm_from_config(cfg);
        let mut pipeline = Self::with_llm(llm, cfg.pipeline_settings());
        if let Some(system_prompt) = cfg.system_prompt_override() {
            info!("Using system prompt override");
            pipeline.system_prompt = system_prompt;
        }
        pipeline
    }

    /// 指定 LLM 后端（测试与嵌入使用）
    pub fn with_llm(llm: Arc<dyn LlmClient>, settings: PipelineSection) -> Self {
        Self {
            llm,
            settings,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            coordinator: Arc::new(Coordinator::standard()),
            supervisor: RunSupervisor::new(),
        }
    }

    pub fn supervisor(&self) -> &RunSupervisor {
        &self.supervisor
    }

    pub fn settings(&self) -> &PipelineSection {
        &self.settings
    }

    /// 对单个请求启动一次运行；空 prompt 在任何阶段开始前拒绝
    pub async fn start_run(&self, request: GenerateRequest) -> Result<RunHandle, PipelineError> {
        if request.prompt.trim().is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }
        let state = request.into_state();

        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = self.supervisor.register(&run_id).await;
        let (signal_tx, signal_rx) = mpsc::channel::<ExecSignal>(SIGNAL_BUFFER);
        let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(EVENT_BUFFER);

        let started_at = Utc::now().to_rfc3339();
        info!(run_id = %run_id, model = self.llm.model_name(), "Run started");
        let _ = signal_tx
            .send(ExecSignal::RunStarted {
                run_id: run_id.clone(),
                started_at,
            })
            .await;

        tokio::spawn(pump(signal_rx, event_tx, cancel.clone()));

        let ctx = StageContext {
            llm: self.llm.clone(),
            settings: self.settings.clone(),
            signals: signal_tx.clone(),
            scheduler: Arc::new(TaskScheduler::new(self.settings.max_parallel_screens)),
            cancel: cancel.clone(),
            system_prompt: self.system_prompt.clone(),
        };
        let coordinator = self.coordinator.clone();
        let supervisor = self.supervisor.clone();
        let id = run_id.clone();

        // 信号发送端全部释放后 pump 结束，客户端事件流随之关闭
        let task = tokio::spawn(async move {
            let result = tokio::spawn(async move { coordinator.run(state, &ctx).await })
                .await
                .map_err(|e| PipelineError::Join(e.to_string()));
            if let Err(e) = &result {
                error!(run_id = %id, error = %e, "Run task failed");
                let _ = signal_tx
                    .send(ExecSignal::RunFailed {
                        message: e.to_string(),
                    })
                    .await;
            }
            supervisor.remove(&id).await;
            result
        });

        Ok(RunHandle {
            run_id,
            events: event_rx,
            cancel,
            task,
        })
    }

    /// 跑完一次运行并收集全部事件
    pub async fn run_to_completion(
        &self,
        request: GenerateRequest,
    ) -> Result<(Vec<ClientEvent>, RunOutcome), PipelineError> {
        let handle = self.start_run(request).await?;
        let (mut events_rx, join) = handle.split();
        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            events.push(event);
        }
        let outcome = join.join().await?;
        Ok((events, outcome))
    }
}
