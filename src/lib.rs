//! Nectar - 嵌入式对话助手的多 Agent 编排与流式回复管道
//!
//! 模块划分：
//! - **assistant**: 组件装配（网关、编译器、执行器、插件注册表）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与会话监管（取消令牌）
//! - **gateway**: 模型网关（系统提示词、模型选择、超时、兜底回复）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **plugins**: 带 semver 清单的插件注册表与内置插件
//! - **session**: 对话会话（消息列表、占位消息生命周期、忙碌策略）
//! - **stream**: 执行器事件到流式块的归一化
//! - **workflow**: 工作流声明、编译、任务图执行、定义文件加载

pub mod assistant;
pub mod config;
pub mod core;
pub mod gateway;
pub mod llm;
pub mod observability;
pub mod plugins;
pub mod session;
pub mod stream;
pub mod workflow;

pub use assistant::{create_assistant, Assistant, AssistantBuilder};
pub use session::{ContentType, ConversationSession, Message, Role};
