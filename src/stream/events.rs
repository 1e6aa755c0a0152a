//! 流式协议事件
//!
//! - ExecutorEvent：执行器在运行过程中发出的原始事件
//! - StreamChunk：经 StreamAdapter 归一化后交给会话与 UI 的块

use serde::{Deserialize, Serialize};

/// 执行器事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorEvent {
    /// 某个任务完成后的进度摘要
    Progress { task_id: String, message: String },
    /// 全部任务完成（终止事件）
    Complete { result: String },
    /// 运行失败（终止事件）；只含面向用户的文案
    Error { error: String },
}

impl ExecutorEvent {
    /// Complete / Error 结束一次运行
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutorEvent::Complete { .. } | ExecutorEvent::Error { .. })
    }
}

/// 归一化后的流式块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// 增量内容：content 为本次增量，accumulated_content 为到目前为止的全文
    Content {
        content: String,
        #[serde(rename = "accumulatedContent")]
        accumulated_content: String,
    },
    Error { error: String },
}

impl StreamChunk {
    pub fn is_error(&self) -> bool {
        matches!(self, StreamChunk::Error { .. })
    }
}
