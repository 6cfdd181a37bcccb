//! Screenloom 命令行
//!
//! 对单轮请求跑一次管线：事件按 NDJSON 写到 stdout，日志写到 stderr，Ctrl+C 取消当前运行。
//!
//! ```text
//! screenloom --prompt "a todo app"
//! screenloom --request turn2.json --state-out state.json
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use screenloom::config::load_config;
use screenloom::core::{GenerateRequest, RunStatus};
use screenloom::observability;
use screenloom::runtime::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "screenloom", version, about = "Turn a product idea into UI screens")]
struct Cli {
    /// 配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 请求 JSON 文件（GenerateRequest，恢复字段取自上一轮 done.state）
    #[arg(long, conflicts_with = "prompt")]
    request: Option<PathBuf>,

    /// 直接给出产品想法（新对话）
    #[arg(long)]
    prompt: Option<String>,

    /// 运行结束后把最终状态写到该文件
    #[arg(long)]
    state_out: Option<PathBuf>,
}

fn read_request(cli: &Cli) -> anyhow::Result<GenerateRequest> {
    match (&cli.request, &cli.prompt) {
        (Some(path), _) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request file {}", path.display()))?;
            serde_json::from_str(&text).context("Request file is not a valid GenerateRequest")
        }
        (None, Some(prompt)) => Ok(GenerateRequest::new(prompt.clone())),
        (None, None) => anyhow::bail!("Either --request or --prompt is required"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let request = read_request(&cli)?;

    let pipeline = Pipeline::from_config(&cfg);
    let handle = pipeline
        .start_run(request)
        .await
        .context("Failed to start run")?;
    let (mut events, join) = handle.split();

    let cancel = join.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, cancelling run");
            cancel.cancel();
        }
    });

    let stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        let mut out = stdout.lock();
        out.write_all(event.to_ndjson().as_bytes())
            .context("Failed to write event")?;
        out.flush().ok();
    }

    let outcome = join.join().await.context("Run failed")?;
    match &outcome.status {
        RunStatus::Finished => info!(
            screens = outcome.state.generated_screens.len(),
            "All screens generated"
        ),
        RunStatus::Halted(awaiting) => info!(?awaiting, "Waiting for user input"),
        RunStatus::Cancelled { at } => warn!(at = %at, "Run cancelled"),
    }

    if let Some(path) = &cli.state_out {
        let json = serde_json::to_string_pretty(&outcome.state)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write state to {}", path.display()))?;
        info!("State written to {}", path.display());
    }

    Ok(())
}
