//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：回显最后一条 User 消息
//! - ScriptedLlmClient：按顺序返回预设结果（含失败），并记录收到的请求

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatRequest, LlmClient, LlmError, TokenStream};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let last_user = request.last_user_content().unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<TokenStream, LlmError> {
        let content = self.complete(request).await?;
        Ok(split_tokens(&content))
    }
}

/// 脚本化客户端：每次调用弹出一条预设回复；脚本耗尽后回落到 fallback
#[derive(Debug)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Ok("ok".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都返回同一结果
    pub fn always(result: Result<String, LlmError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用都失败
    pub fn failing(err: LlmError) -> Self {
        Self::always(Err(err))
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_result(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.next_result(request)
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<TokenStream, LlmError> {
        let content = self.next_result(request)?;
        Ok(split_tokens(&content))
    }
}

/// 按空白切分为 Token（保留分隔符，拼接后与原文一致）
fn split_tokens(content: &str) -> TokenStream {
    let tokens: Vec<Result<String, LlmError>> = content
        .split_inclusive(' ')
        .map(|t| Ok(t.to_string()))
        .collect();
    Box::pin(stream::iter(tokens))
}
