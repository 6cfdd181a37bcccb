//! 屏幕 HTML 的 Token 过滤：文档起点之前的说明文字丢弃，之后的片段原样转发

use crate::events::thinking::retain_tail;
use crate::parse::find_document_start;

/// 最长的起点标记 `<!doctype` 减一
const MARKER_TAIL: usize = 8;

#[derive(Debug, Default)]
pub struct CodeChunkDetector {
    buffer: String,
    started: bool,
}

impl CodeChunkDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if self.started {
            return Some(fragment.to_string()).filter(|s| !s.is_empty());
        }
        self.buffer.push_str(fragment);
        let Some(start) = find_document_start(&self.buffer) else {
            retain_tail(&mut self.buffer, MARKER_TAIL);
            return None;
        };
        self.started = true;
        let chunk = self.buffer.split_off(start);
        self.buffer.clear();
        Some(chunk)
    }

    pub fn started(&self) -> bool {
        self.started
    }
}
