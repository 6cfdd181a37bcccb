//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod factory;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use factory::{create_deepseek_client, create_llm_from_config, demo_client, DEEPSEEK_CHAT};
pub use message::{flatten_messages, Message, Role};
pub use mock::{MockCall, MockLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{with_timeout, GenerationOptions, LlmClient, LlmError, TokenStream};
