//! 模型网关：单 Agent 的请求 / 流式调用
//!
//! - `prompt`：按页面、角色、工作区生成系统提示词，附加页面指引
//! - `client`：模型选择、采样参数、超时、审计日志；失败转为兜底回复

pub mod client;
pub mod prompt;

pub use client::{Completion, GatewaySettings, ModelGateway};
pub use prompt::{requires_reasoning, PromptBuilder};
