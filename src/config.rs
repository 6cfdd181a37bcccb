//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCREENLOOM__*` 覆盖（双下划线表示嵌套，如 `SCREENLOOM__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、Prompt 目录
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 存放 system.txt 等覆盖用 prompt 的目录，未设置时用 config/prompts
    pub prompts_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmModelOverride,
    pub openai: LlmModelOverride,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmModelOverride::default(),
            openai: LlmModelOverride::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmModelOverride {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 建立一次模型请求的上限，秒
    pub request: u64,
    /// 单次流式调用（从发起到最后一个 Token）的上限，秒
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 300,
        }
    }
}

/// [pipeline] 段：并发上限、澄清轮数、各阶段温度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 并行生成屏幕时同时进行的模型调用数上限
    pub max_parallel_screens: usize,
    /// 澄清问题的最大轮数，达到后直接进入规划
    pub max_clarification_questions: usize,
    pub temperatures: TemperatureSection,
    /// 单次流式调用超时（秒），由 llm.timeouts.stream 同步过来
    #[serde(skip)]
    pub stream_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_parallel_screens: 4,
            max_clarification_questions: 3,
            temperatures: TemperatureSection::default(),
            stream_timeout_secs: LlmTimeoutsSection::default().stream,
        }
    }
}

/// [pipeline.temperatures] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemperatureSection {
    pub clarifier: f32,
    pub design_system: f32,
    pub architect: f32,
    pub designer: f32,
}

impl Default for TemperatureSection {
    fn default() -> Self {
        Self {
            clarifier: 0.3,
            design_system: 0.9,
            architect: 0.4,
            designer: 0.7,
        }
    }
}

/// [server] 段：Web 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// 管线实际使用的参数（合并 llm.timeouts.stream）
    pub fn pipeline_settings(&self) -> PipelineSection {
        let mut settings = self.pipeline.clone();
        settings.stream_timeout_secs = self.llm.timeouts.stream;
        settings
    }

    /// 可选的 system prompt 覆盖：<prompts_dir>/system.txt
    pub fn system_prompt_override(&self) -> Option<String> {
        let dir = self
            .app
            .prompts_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("config/prompts"));
        std::fs::read_to_string(dir.join("system.txt"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// 从 config 目录加载配置，环境变量 SCREENLOOM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCREENLOOM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCREENLOOM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
