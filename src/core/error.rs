//! 助手错误类型
//!
//! 四类主错误（网络 / 模型 / 校验 / 执行）加上超时、取消、会话忙等运行时错误。
//! 所有错误只进日志，展示给用户的始终是固定文案 [`FALLBACK_ERROR_MESSAGE`]。

use thiserror::Error;

use crate::llm::LlmError;

/// 任何失败在对话中展示的固定文案（不含底层错误细节）
pub const FALLBACK_ERROR_MESSAGE: &str =
    "Sorry, I ran into a problem while working on that. Please try again in a moment.";

/// 会话正忙时返回的文案
pub const BUSY_MESSAGE: &str =
    "I'm still working on your previous request. Please wait for it to finish.";

/// 编排管道中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssistantError {
    /// 模型服务不可达
    #[error("Network error: {0}")]
    Network(String),

    /// 模型返回失败或空结果
    #[error("Model error: {0}")]
    Model(String),

    /// 工作流或任务图定义错误（编译期）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 某个任务的 Agent 调用失败
    #[error("Execution error in task {task_id}: {reason}")]
    Execution { task_id: String, reason: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    /// 同一会话已有请求在执行
    #[error("Session is busy")]
    Busy,

    #[error("Config error: {0}")]
    Config(String),
}

impl AssistantError {
    /// 面向用户的文案：忙碌提示单独处理，其余一律固定兜底文案
    pub fn user_message(&self) -> &'static str {
        match self {
            AssistantError::Busy => BUSY_MESSAGE,
            _ => FALLBACK_ERROR_MESSAGE,
        }
    }
}

impl From<LlmError> for AssistantError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Network(msg) => AssistantError::Network(msg),
            LlmError::Timeout(secs) => AssistantError::Timeout(secs),
            LlmError::Api(msg) => AssistantError::Model(msg),
            LlmError::EmptyResponse => AssistantError::Model("empty response".to_string()),
            LlmError::InvalidRequest(msg) => AssistantError::Model(msg),
        }
    }
}
