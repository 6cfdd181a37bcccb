//! 屏幕 HTML 的清洗
//!
//! 模型常把页面包在 ```html 围栏里、前面带一段说明，偶尔整段加引号；这里统一去掉。

use std::sync::OnceLock;

use regex::Regex;

const DOCTYPE_MARKER: &str = "<!doctype";
const HTML_MARKER: &str = "<html";

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*$\n?").unwrap())
}

/// 文档起点（`<!DOCTYPE` 或 `<html`，ASCII 大小写不敏感）的字节位置，取最早者
pub fn find_document_start(text: &str) -> Option<usize> {
    // to_ascii_lowercase 不改变字节长度，位置可直接用于原串
    let lower = text.to_ascii_lowercase();
    match (lower.find(DOCTYPE_MARKER), lower.find(HTML_MARKER)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// 去围栏、去一层包裹引号、去文档起点之前的说明文字
pub fn clean_markup(raw: &str) -> String {
    let unfenced = fence_re().replace_all(raw, "");
    let mut text = unfenced.trim();

    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
            break;
        }
    }

    if let Some(start) = find_document_start(text) {
        text = &text[start..];
    }
    text.trim().to_string()
}
