//! 对话会话
//!
//! 唯一面向调用方 UI 的组件：持有有序消息列表，管理一次发送的生命周期
//! `Idle -> PlaceholderOpen -> Accumulating* -> Finalized`。
//!
//! - 占位消息只按 id 定位（id -> 累计内容），从不按列表位置
//! - 占位被 clear_messages 移除后，后续块直接丢弃
//! - 同一会话同时只允许一次发送，忙时按 BusyPolicy 拒绝或排队
//! - 任何失败都以一条 Error 类型的助手消息结束，不向调用方返回错误

pub mod message;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::BusyPolicy;
use crate::core::{AssistantError, SessionSupervisor, FALLBACK_ERROR_MESSAGE};
use crate::stream::{ChunkStream, StreamChunk};
use crate::workflow::{ContextMap, RunOutput, TaskGraphExecutor, Workflow, WorkflowCompiler, WorkflowError};

pub use message::{ContentType, Message, Role};

/// 一次发送所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    #[default]
    Idle,
    /// 占位消息已插入，尚未收到内容
    PlaceholderOpen,
    /// 正在累计内容
    Accumulating,
    /// 占位消息已定稿
    Finalized,
}

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    /// 占位消息 id -> 已累计内容
    accumulators: HashMap<String, String>,
    active_placeholder: Option<String>,
    phase: SendPhase,
}

/// 对话会话
pub struct ConversationSession {
    id: String,
    compiler: Arc<WorkflowCompiler>,
    executor: Arc<TaskGraphExecutor>,
    busy_policy: BusyPolicy,
    /// 发送互斥锁（跨 await 持有）
    send_lock: AsyncMutex<()>,
    /// 消息与占位状态（不跨 await 持有）
    state: Mutex<SessionState>,
    supervisor: SessionSupervisor,
}

impl ConversationSession {
    pub fn new(
        compiler: Arc<WorkflowCompiler>,
        executor: Arc<TaskGraphExecutor>,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            compiler,
            executor,
            busy_policy,
            send_lock: AsyncMutex::new(()),
            state: Mutex::new(SessionState::default()),
            supervisor: SessionSupervisor::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 当前消息列表（快照）
    pub fn messages(&self) -> Vec<Message> {
        self.with_state(|s| s.messages.clone())
    }

    pub fn phase(&self) -> SendPhase {
        self.with_state(|s| s.phase)
    }

    /// 是否有发送在进行
    pub fn is_busy(&self) -> bool {
        self.send_lock.try_lock().is_err()
    }

    /// 取消进行中的发送；没有时返回 false
    pub fn cancel(&self) -> bool {
        self.supervisor.cancel()
    }

    /// 清空消息列表
    pub fn clear_messages(&self) {
        self.with_state(|s| {
            s.messages.clear();
            s.accumulators.clear();
        });
        debug!(session = %self.id, "Messages cleared");
    }

    /// 非流式发送：返回定稿的助手消息
    pub async fn send(&self, content: &str, context: &ContextMap) -> Message {
        let _guard = match self.acquire().await {
            Ok(guard) => guard,
            Err(e) => return Message::error(e.user_message()),
        };

        self.push(Message::user(content));
        let cancel = self.supervisor.begin();

        let graph = self.compiler.compile_message(content, context);
        let reply = match self.executor.run(&graph, content, cancel).await {
            Ok(output) if output.is_success() => Message::assistant(output.final_output),
            Ok(output) => {
                warn!(session = %self.id, error = ?output.error, "Send failed");
                Message::error(FALLBACK_ERROR_MESSAGE)
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Send rejected");
                Message::error(FALLBACK_ERROR_MESSAGE)
            }
        };

        self.supervisor.finish();
        self.push(reply.clone());
        reply
    }

    /// 流式发送：单消息
    pub async fn send_streaming<F>(&self, content: &str, context: &ContextMap, on_chunk: F) -> Message
    where
        F: FnMut(&StreamChunk) + Send,
    {
        self.stream_request(content, None, context, on_chunk).await
    }

    /// 流式发送：按声明的工作流执行
    pub async fn send_workflow<F>(
        &self,
        content: &str,
        workflow: &Workflow,
        context: &ContextMap,
        on_chunk: F,
    ) -> Message
    where
        F: FnMut(&StreamChunk) + Send,
    {
        self.stream_request(content, Some(workflow), context, on_chunk).await
    }

    async fn stream_request<F>(
        &self,
        content: &str,
        workflow: Option<&Workflow>,
        context: &ContextMap,
        mut on_chunk: F,
    ) -> Message
    where
        F: FnMut(&StreamChunk) + Send,
    {
        let _guard = match self.acquire().await {
            Ok(guard) => guard,
            Err(e) => return Message::error(e.user_message()),
        };

        self.push(Message::user(content));
        let placeholder = Message::placeholder();
        self.open_placeholder(placeholder.clone());

        let graph = match self.compiler.compile_request(content, workflow, context) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Workflow rejected before execution");
                on_chunk(&StreamChunk::Error {
                    error: FALLBACK_ERROR_MESSAGE.to_string(),
                });
                return self.finalize(&placeholder, Err(e), None);
            }
        };

        let cancel = self.supervisor.begin();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut chunks = ChunkStream::new(rx);

        let run = self.executor.run_streaming(&graph, content, cancel, tx);
        let consume = async {
            let mut terminal_error = None;
            while let Some(chunk) = chunks.next().await {
                self.apply_chunk(&placeholder.id, &chunk);
                if let StreamChunk::Error { error } = &chunk {
                    terminal_error = Some(error.clone());
                }
                on_chunk(&chunk);
            }
            terminal_error
        };
        let (outcome, terminal_error) = tokio::join!(run, consume);

        self.supervisor.finish();
        self.finalize(&placeholder, outcome, terminal_error)
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, AssistantError> {
        match self.busy_policy {
            BusyPolicy::Reject => self.send_lock.try_lock().map_err(|_| {
                debug!(session = %self.id, "Send rejected, session busy");
                AssistantError::Busy
            }),
            BusyPolicy::Queue => Ok(self.send_lock.lock().await),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn push(&self, message: Message) {
        self.with_state(|s| s.messages.push(message));
    }

    fn open_placeholder(&self, placeholder: Message) {
        self.with_state(|s| {
            s.accumulators.insert(placeholder.id.clone(), String::new());
            s.active_placeholder = Some(placeholder.id.clone());
            s.messages.push(placeholder);
            s.phase = SendPhase::PlaceholderOpen;
        });
        debug!(session = %self.id, "Placeholder opened");
    }

    /// 内容块追加到占位消息（按 id）；占位已被清除时丢弃
    fn apply_chunk(&self, placeholder_id: &str, chunk: &StreamChunk) {
        let StreamChunk::Content { content, .. } = chunk else {
            return;
        };
        self.with_state(|s| {
            let Some(accumulated) = s.accumulators.get_mut(placeholder_id) else {
                return;
            };
            accumulated.push_str(content);
            if let Some(message) = s.messages.iter_mut().find(|m| m.id == placeholder_id) {
                message.content.push_str(content);
            }
            s.phase = SendPhase::Accumulating;
        });
    }

    /// 定稿占位消息（同一 id）
    ///
    /// 成功时内容为累计内容；失败时为累计内容后接兜底文案，类型为 Error。
    fn finalize(
        &self,
        placeholder: &Message,
        outcome: Result<RunOutput, WorkflowError>,
        terminal_error: Option<String>,
    ) -> Message {
        self.with_state(|s| {
            let accumulated = s.accumulators.remove(&placeholder.id).unwrap_or_default();

            let failed = match &outcome {
                Ok(output) => !output.is_success(),
                Err(_) => true,
            } || terminal_error.is_some();

            let (content, content_type) = if failed {
                let error_text = terminal_error.unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
                let content = if accumulated.trim().is_empty() {
                    error_text
                } else {
                    format!("{}\n\n{}", accumulated, error_text)
                };
                (content, ContentType::Error)
            } else {
                let content_type = ContentType::classify(&accumulated);
                (accumulated, content_type)
            };

            s.active_placeholder = None;
            s.phase = SendPhase::Finalized;

            match s.messages.iter_mut().find(|m| m.id == placeholder.id) {
                Some(message) => {
                    message.content = content;
                    message.content_type = content_type;
                    message.is_streaming = false;
                    message.clone()
                }
                None => {
                    debug!(session = %self.id, "Placeholder cleared before finalize");
                    Message {
                        content,
                        content_type,
                        is_streaming: false,
                        ..placeholder.clone()
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::gateway::{GatewaySettings, ModelGateway};
    use crate::llm::{ChatRequest, LlmClient, LlmError, ScriptedLlmClient, TokenStream};
    use crate::workflow::WorkflowBuilder;

    fn session_with(client: Arc<dyn LlmClient>, policy: BusyPolicy) -> ConversationSession {
        let gateway = Arc::new(ModelGateway::new(client, GatewaySettings::default()));
        ConversationSession::new(
            Arc::new(WorkflowCompiler::default()),
            Arc::new(TaskGraphExecutor::new(gateway)),
            policy,
        )
    }

    fn session(client: ScriptedLlmClient) -> ConversationSession {
        session_with(Arc::new(client), BusyPolicy::Reject)
    }

    /// 每次调用前等待一段时间
    struct SlowClient(Duration);

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            tokio::time::sleep(self.0).await;
            Ok(format!("reply to {}", request.last_user_content().unwrap_or("")))
        }

        async fn complete_stream(&self, _request: &ChatRequest) -> Result<TokenStream, LlmError> {
            Err(LlmError::InvalidRequest("not used".into()))
        }
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant() {
        let s = session(ScriptedLlmClient::always(Ok("Hi!".into())));
        let reply = s.send("Hello", &ContextMap::new()).await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.content_type, ContentType::Text);
        let messages = s.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1], reply);
    }

    #[tokio::test]
    async fn test_send_never_fails_on_provider_error() {
        let s = session(ScriptedLlmClient::failing(LlmError::Network("refused".into())));
        let reply = s.send("Hello", &ContextMap::new()).await;
        assert_eq!(reply.content_type, ContentType::Error);
        assert_eq!(reply.content, FALLBACK_ERROR_MESSAGE);
        assert_eq!(s.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_streaming_keeps_placeholder_id_and_matches_chunks() {
        let s = session(ScriptedLlmClient::always(Ok("```js\nlet x;\n```".into())));
        let mut chunks = Vec::new();
        let reply = s
            .send_streaming("code please", &ContextMap::new(), |c| chunks.push(c.clone()))
            .await;

        let messages = s.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, reply.id);
        assert!(!reply.is_streaming);
        assert_eq!(reply.content_type, ContentType::Markdown);
        assert_eq!(s.phase(), SendPhase::Finalized);

        let last_accumulated = chunks
            .iter()
            .rev()
            .find_map(|c| match c {
                StreamChunk::Content {
                    accumulated_content, ..
                } => Some(accumulated_content.clone()),
                StreamChunk::Error { .. } => None,
            })
            .unwrap();
        assert_eq!(reply.content, last_accumulated);
        assert!(reply.content.ends_with("```js\nlet x;\n```"));
    }

    #[tokio::test]
    async fn test_workflow_failure_keeps_progress_and_appends_fallback() {
        let s = session(ScriptedLlmClient::new(vec![
            Ok("notes".into()),
            Err(LlmError::Api("boom".into())),
        ]));
        let workflow = WorkflowBuilder::new("wf")
            .step("A", "be A", "go", "notes")
            .step("B", "be B", "go", "draft")
            .step("C", "be C", "go", "final")
            .build()
            .unwrap();

        let mut errors = 0;
        let reply = s
            .send_workflow("topic", &workflow, &ContextMap::new(), |c| {
                if c.is_error() {
                    errors += 1;
                }
            })
            .await;

        assert_eq!(errors, 1);
        assert_eq!(reply.content_type, ContentType::Error);
        assert!(reply.content.starts_with("[1/3] A finished"));
        assert!(reply.content.ends_with(FALLBACK_ERROR_MESSAGE));
        assert!(!reply.content.contains("boom"));
    }

    #[tokio::test]
    async fn test_invalid_workflow_finalizes_with_error() {
        let client = Arc::new(ScriptedLlmClient::always(Ok("x".into())));
        let s = session_with(client.clone(), BusyPolicy::Reject);
        let empty = Workflow {
            name: "empty".into(),
            description: String::new(),
            steps: vec![],
            context_variables: ContextMap::new(),
        };

        let reply = s.send_workflow("hi", &empty, &ContextMap::new(), |_| {}).await;
        assert_eq!(reply.content, FALLBACK_ERROR_MESSAGE);
        assert_eq!(reply.content_type, ContentType::Error);
        assert_eq!(s.messages()[1].id, reply.id);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_second_send() {
        let s = session_with(Arc::new(SlowClient(Duration::from_millis(50))), BusyPolicy::Reject);
        let ctx = ContextMap::new();

        let (first, second) = tokio::join!(s.send("one", &ctx), s.send("two", &ctx));

        assert_eq!(first.content_type, ContentType::Text);
        assert_eq!(second.content_type, ContentType::Error);
        assert_eq!(second.content, crate::core::BUSY_MESSAGE);
        let messages = s.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "one");
    }

    #[tokio::test]
    async fn test_queue_policy_serializes_sends() {
        let s = session_with(Arc::new(SlowClient(Duration::from_millis(20))), BusyPolicy::Queue);
        let ctx = ContextMap::new();

        let (first, second) = tokio::join!(s.send("one", &ctx), s.send("two", &ctx));
        assert!(!first.is_error());
        assert!(!second.is_error());

        let roles: Vec<Role> = s.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    fn last_accumulated(chunks: &[StreamChunk]) -> String {
        chunks
            .iter()
            .rev()
            .find_map(|c| match c {
                StreamChunk::Content {
                    accumulated_content, ..
                } => Some(accumulated_content.clone()),
                StreamChunk::Error { .. } => None,
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_busy_session_rejects_second_streaming_send() {
        let s = session_with(Arc::new(SlowClient(Duration::from_millis(50))), BusyPolicy::Reject);
        let ctx = ContextMap::new();
        let workflow = WorkflowBuilder::new("wf")
            .step("A", "be A", "go", "notes")
            .build()
            .unwrap();

        let mut open_placeholders = Vec::new();
        let (first, second, third) = tokio::join!(
            s.send_streaming("alpha", &ctx, |_| {
                open_placeholders.push(s.messages().iter().filter(|m| m.is_streaming).count());
            }),
            s.send_streaming("bravo", &ctx, |_| {}),
            s.send_workflow("charlie", &workflow, &ctx, |_| {}),
        );

        assert!(!first.is_error());
        for rejected in [&second, &third] {
            assert_eq!(rejected.content_type, ContentType::Error);
            assert_eq!(rejected.content, crate::core::BUSY_MESSAGE);
        }
        assert!(!open_placeholders.is_empty());
        assert!(open_placeholders.iter().all(|n| *n == 1));

        let messages = s.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "alpha");
        assert_eq!(messages[1].id, first.id);
        assert_eq!(messages[1], first);
    }

    #[tokio::test]
    async fn test_queue_policy_keeps_streaming_replies_apart() {
        let s = session_with(Arc::new(SlowClient(Duration::from_millis(20))), BusyPolicy::Queue);
        let ctx = ContextMap::new();
        let workflow = WorkflowBuilder::new("wf")
            .step("A", "be A", "go", "notes")
            .build()
            .unwrap();

        let mut first_chunks = Vec::new();
        let mut second_chunks = Vec::new();
        let (first, second) = tokio::join!(
            s.send_streaming("alpha", &ctx, |c| first_chunks.push(c.clone())),
            s.send_workflow("bravo", &workflow, &ctx, |c| second_chunks.push(c.clone())),
        );

        assert!(!first.is_error());
        assert!(!second.is_error());
        assert_ne!(first.id, second.id);
        assert_eq!(first.content, last_accumulated(&first_chunks));
        assert_eq!(second.content, last_accumulated(&second_chunks));
        assert!(first.content.contains("alpha") && !first.content.contains("bravo"));
        assert!(second.content.contains("bravo") && !second.content.contains("alpha"));

        let messages = s.messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(messages[1], first);
        assert_eq!(messages[3], second);
    }

    #[tokio::test]
    async fn test_failed_stream_appends_error_after_streamed_text() {
        let s = session(ScriptedLlmClient::new(vec![
            Ok("notes".into()),
            Err(LlmError::Network("reset".into())),
        ]));
        let workflow = WorkflowBuilder::new("wf")
            .step("A", "be A", "go", "notes")
            .step("B", "be B", "go", "draft")
            .build()
            .unwrap();

        let mut chunks = Vec::new();
        let reply = s
            .send_workflow("topic", &workflow, &ContextMap::new(), |c| chunks.push(c.clone()))
            .await;

        let streamed = last_accumulated(&chunks);
        assert!(!streamed.is_empty());
        assert_eq!(reply.content, format!("{}\n\n{}", streamed, FALLBACK_ERROR_MESSAGE));
        assert_eq!(reply.content_type, ContentType::Error);
        assert_eq!(s.messages()[1], reply);
    }

    #[tokio::test]
    async fn test_failed_stream_without_text_is_just_the_error() {
        let s = session(ScriptedLlmClient::failing(LlmError::Api("down".into())));
        let mut chunks = Vec::new();
        let reply = s
            .send_streaming("hi", &ContextMap::new(), |c| chunks.push(c.clone()))
            .await;

        assert_eq!(last_accumulated(&chunks), "");
        assert_eq!(reply.content, FALLBACK_ERROR_MESSAGE);
        assert_eq!(reply.content_type, ContentType::Error);
    }

    #[tokio::test]
    async fn test_clear_during_streaming_drops_late_chunks() {
        let s = session(ScriptedLlmClient::always(Ok("answer".into())));
        let reply = s
            .send_streaming("q", &ContextMap::new(), |_| s.clear_messages())
            .await;

        assert!(s.messages().is_empty());
        assert!(!reply.is_streaming);
        assert_eq!(s.phase(), SendPhase::Finalized);
    }

    #[tokio::test]
    async fn test_cancel_finalizes_with_error() {
        let s = session_with(Arc::new(SlowClient(Duration::from_secs(30))), BusyPolicy::Reject);
        let ctx = ContextMap::new();

        let cancel_soon = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(s.cancel());
        };
        let (reply, _) = tokio::join!(s.send_streaming("slow", &ctx, |_| {}), cancel_soon);

        assert_eq!(reply.content_type, ContentType::Error);
        assert!(!s.is_busy());
        assert!(!s.cancel());
    }
}
