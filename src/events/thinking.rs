//! 从 Token 流中抽取 `<thinking>…</thinking>` 叙述
//!
//! 标记可能被切在任意两个片段之间：开标记之前一直缓冲；进入之后，结尾若可能是半个闭标记就先扣下，
//! 确认不是再放出。闭标记之后的内容全部忽略。

use crate::parse::{THINKING_CLOSE, THINKING_OPEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    Inside,
    Done,
}

#[derive(Debug)]
pub struct ThinkingExtractor {
    phase: Phase,
    buffer: String,
}

impl Default for ThinkingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingExtractor {
    pub fn new() -> Self {
        Self {
            phase: Phase::Searching,
            buffer: String::new(),
        }
    }

    /// 输入一个片段，返回可以立即显示的叙述文本
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        match self.phase {
            Phase::Done => None,
            Phase::Searching => {
                self.buffer.push_str(fragment);
                let Some(start) = self.buffer.find(THINKING_OPEN) else {
                    retain_tail(&mut self.buffer, THINKING_OPEN.len() - 1);
                    return None;
                };
                let rest = self.buffer[start + THINKING_OPEN.len()..].to_string();
                self.buffer.clear();
                self.phase = Phase::Inside;
                self.consume_inside(&rest)
            }
            Phase::Inside => self.consume_inside(fragment),
        }
    }

    fn consume_inside(&mut self, fragment: &str) -> Option<String> {
        let mut pending = std::mem::take(&mut self.buffer);
        pending.push_str(fragment);

        if let Some(end) = pending.find(THINKING_CLOSE) {
            self.phase = Phase::Done;
            pending.truncate(end);
            return Some(pending).filter(|s| !s.is_empty());
        }

        let held = partial_suffix_len(&pending, THINKING_CLOSE);
        self.buffer = pending.split_off(pending.len() - held);
        Some(pending).filter(|s| !s.is_empty())
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

/// 只留结尾至少 keep 字节（按字符边界），够拼出下一片段里被切开的 ASCII 标记
pub(crate) fn retain_tail(buffer: &mut String, keep: usize) {
    if buffer.len() <= keep {
        return;
    }
    let mut cut = buffer.len() - keep;
    while !buffer.is_char_boundary(cut) {
        cut -= 1;
    }
    buffer.drain(..cut);
}

/// text 结尾与 marker 开头重合的最长长度（不含完整 marker）
fn partial_suffix_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}
