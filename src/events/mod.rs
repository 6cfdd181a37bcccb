//! 事件层：执行信号、客户端协议与两者之间的翻译（thinking 抽取、HTML 分流）

pub mod code_chunk;
pub mod protocol;
pub mod signal;
pub mod thinking;
pub mod translator;

pub use code_chunk::CodeChunkDetector;
pub use protocol::{ClientEvent, ScreenRef, ScreenResult, StepName, StepStatus};
pub use signal::{ExecSignal, SignalSender, TokenSink};
pub use thinking::ThinkingExtractor;
pub use translator::{pump, step_name, EventTranslator};
