//! 会话监管：取消令牌
//!
//! 每次发送一个新 token；cancel 只取消当前这次发送，之后的发送拿到新 token。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：当前发送的取消令牌
#[derive(Debug)]
pub struct SessionSupervisor {
    /// 当前发送的 token
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// 为新的一次发送创建 token
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(token.clone());
        }
        token
    }

    /// 发送结束后释放 token
    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
    }

    /// 取消当前发送（Stop generating）；没有进行中的发送时返回 false
    pub fn cancel(&self) -> bool {
        match self.current.lock() {
            Ok(current) => match current.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
