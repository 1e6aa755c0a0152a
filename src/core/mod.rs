//! 核心层：错误类型与会话监管

pub mod error;
pub mod session_supervisor;

pub use error::{AssistantError, BUSY_MESSAGE, FALLBACK_ERROR_MESSAGE};
pub use session_supervisor::SessionSupervisor;
