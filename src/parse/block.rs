//! 结构化输出解析：从模型回复中取出 JSON 块并反序列化
//!
//! 查找顺序：去掉 `<thinking>…</thinking>` → ```json / 裸 ``` 围栏 → 第一个配平的 `{…}`（识别字符串与转义）。

use serde::de::DeserializeOwned;
use thiserror::Error;

pub const THINKING_OPEN: &str = "<thinking>";
pub const THINKING_CLOSE: &str = "</thinking>";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("No structured block found in model output")]
    NoStructuredBlock,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Response does not match the expected shape: {0}")]
    Schema(String),
}

/// 解析后的结构化回复；`validate` 检查 serde 表达不了的约束
pub trait StructuredResponse: DeserializeOwned {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 去掉 thinking 段；只有开标记时去掉其后全部内容
pub fn strip_thinking(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(THINKING_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + THINKING_OPEN.len()..];
        match after.find(THINKING_CLOSE) {
            Some(end) => rest = &after[end + THINKING_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// 找出 JSON 文本（未校验）
pub fn extract_structured_block(text: &str) -> Option<&str> {
    if let Some(block) = fenced_block(text) {
        return Some(block);
    }
    balanced_object(text)
}

fn fenced_block(text: &str) -> Option<&str> {
    let (start, marker_len) = match text.find("```json") {
        Some(pos) => (pos, "```json".len()),
        None => (text.find("```")?, "```".len()),
    };
    let body = &text[start + marker_len..];
    let end = body.find("```")?;
    let block = body[..end].trim();
    if block.starts_with('{') || block.starts_with('[') {
        Some(block)
    } else {
        None
    }
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 解析模型回复为 T
pub fn parse_structured<T: StructuredResponse>(text: &str) -> Result<T, ParseError> {
    let visible = strip_thinking(text);
    let block = extract_structured_block(&visible).ok_or(ParseError::NoStructuredBlock)?;

    let value: serde_json::Value =
        serde_json::from_str(block).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let parsed: T = serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    parsed.validate().map_err(ParseError::Schema)?;
    Ok(parsed)
}
