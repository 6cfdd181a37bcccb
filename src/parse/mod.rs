//! 模型输出解析：结构化 JSON 块与 HTML 清洗

pub mod block;
pub mod markup;

pub use block::{
    extract_structured_block, parse_structured, strip_thinking, ParseError, StructuredResponse,
    THINKING_CLOSE, THINKING_OPEN,
};
pub use markup::{clean_markup, find_document_start};
