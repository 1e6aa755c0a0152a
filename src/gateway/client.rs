//! 模型网关
//!
//! 对单个 Agent 的一次请求/流式请求：构造系统提示词、选择模型变体、应用采样参数与超时。
//! 对外的 complete / complete_streaming 从不返回错误：失败被记录后转为 Error 类型的兜底回复。
//! 执行器通过 AgentInvoker 调用网关，此时错误以 AssistantError 返回，由执行器分类。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::{AssistantError, FALLBACK_ERROR_MESSAGE};
use crate::gateway::prompt::{requires_reasoning, PromptBuilder};
use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError, ProviderSelection};
use crate::session::ContentType;
use crate::workflow::{Agent, AgentInvoker, ContextMap, Task, CTX_MAX_TOKENS, CTX_TEMPERATURE};

/// 网关参数：模型变体、默认采样参数与超时
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub default_model: String,
    pub reasoning_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
}

impl GatewaySettings {
    pub fn from_config(cfg: &AppConfig, selection: &ProviderSelection) -> Self {
        Self {
            default_model: selection.default_model.clone(),
            reasoning_model: selection.reasoning_model.clone(),
            temperature: cfg.llm.temperature,
            max_tokens: cfg.llm.max_tokens,
            request_timeout: Duration::from_secs(cfg.llm.timeouts.request),
            stream_timeout: Duration::from_secs(cfg.llm.timeouts.stream),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_model: "mock".to_string(),
            reasoning_model: "mock-reasoner".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(120),
        }
    }
}

/// 网关的一次回复
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub content_type: ContentType,
}

impl Completion {
    fn success(content: String) -> Self {
        let content_type = ContentType::classify(&content);
        Self {
            content,
            content_type,
        }
    }

    fn failure() -> Self {
        Self {
            content: FALLBACK_ERROR_MESSAGE.to_string(),
            content_type: ContentType::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.content_type == ContentType::Error
    }
}

/// 模型网关
pub struct ModelGateway {
    client: Arc<dyn LlmClient>,
    settings: GatewaySettings,
    prompts: PromptBuilder,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn LlmClient>, settings: GatewaySettings) -> Self {
        Self {
            client,
            settings,
            prompts: PromptBuilder::new(),
        }
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// requiresReasoning 为真时选推理模型，否则默认模型
    pub fn select_model(&self, context: &ContextMap) -> &str {
        if requires_reasoning(context) {
            &self.settings.reasoning_model
        } else {
            &self.settings.default_model
        }
    }

    /// 单次请求；失败时返回 Error 类型的兜底回复
    pub async fn complete(&self, message: &str, context: &ContextMap) -> Completion {
        let request = self.build_request(self.prompts.system_prompt(context), message, context, None);
        match self.call(&request).await {
            Ok(content) => Completion::success(content),
            Err(e) => {
                warn!(model = %request.model, error = %e, "Model call failed, returning fallback reply");
                Completion::failure()
            }
        }
    }

    /// 流式请求：每个增量 Token 调用一次 on_token，返回累计全文
    pub async fn complete_streaming<F>(&self, message: &str, context: &ContextMap, mut on_token: F) -> Completion
    where
        F: FnMut(&str) + Send,
    {
        let request = self.build_request(self.prompts.system_prompt(context), message, context, None);
        match self.call_streaming(&request, &mut on_token).await {
            Ok(content) => Completion::success(content),
            Err(e) => {
                warn!(model = %request.model, error = %e, "Streaming model call failed, returning fallback reply");
                Completion::failure()
            }
        }
    }

    fn build_request(
        &self,
        system_prompt: String,
        user_content: &str,
        context: &ContextMap,
        model: Option<&str>,
    ) -> ChatRequest {
        let temperature = context
            .get(CTX_TEMPERATURE)
            .and_then(Value::as_f64)
            .map(|t| t as f32)
            .unwrap_or(self.settings.temperature);
        let max_tokens = context
            .get(CTX_MAX_TOKENS)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.settings.max_tokens);
        let model = model
            .map(str::to_string)
            .unwrap_or_else(|| self.select_model(context).to_string());

        ChatRequest {
            model,
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_content),
            ],
            temperature,
            max_tokens,
        }
    }

    async fn call(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let result = match timeout(self.settings.request_timeout, self.client.complete(request)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(LlmError::EmptyResponse),
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.settings.request_timeout.as_secs())),
        };
        audit(&request.model, "complete", &result, start);
        result
    }

    async fn call_streaming<F>(&self, request: &ChatRequest, on_token: &mut F) -> Result<String, LlmError>
    where
        F: FnMut(&str) + Send,
    {
        let start = Instant::now();
        let streamed = async {
            let mut stream = self.client.complete_stream(request).await?;
            let mut full = String::new();
            while let Some(token) = stream.next().await {
                let token = token?;
                if token.is_empty() {
                    continue;
                }
                on_token(&token);
                full.push_str(&token);
            }
            if full.trim().is_empty() {
                Err(LlmError::EmptyResponse)
            } else {
                Ok(full)
            }
        };
        let result = match timeout(self.settings.stream_timeout, streamed).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.settings.stream_timeout.as_secs())),
        };
        audit(&request.model, "stream", &result, start);
        result
    }
}

#[async_trait]
impl AgentInvoker for ModelGateway {
    async fn invoke(&self, agent: &Agent, task: &Task, prompt: &str) -> Result<String, AssistantError> {
        let mut system_prompt = agent.system_prompt.clone();
        if let Some(section) = self.prompts.context_section(&task.context_data) {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&section);
        }
        let request = self.build_request(system_prompt, prompt, &task.context_data, agent.model.as_deref());
        self.call(&request).await.map_err(AssistantError::from)
    }
}

/// 每次模型调用一行 JSON 审计日志
fn audit(model: &str, mode: &str, result: &Result<String, LlmError>, start: Instant) {
    let (ok, outcome) = match result {
        Ok(_) => (true, "ok"),
        Err(LlmError::Timeout(_)) => (false, "timeout"),
        Err(LlmError::EmptyResponse) => (false, "empty"),
        Err(_) => (false, "error"),
    };
    let audit = serde_json::json!({
        "event": "llm_audit",
        "model": model,
        "mode": mode,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "response_chars": result.as_ref().map(|r| r.chars().count()).unwrap_or(0),
    });
    info!(audit = %audit.to_string(), "llm");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures_util::stream;
    use serde_json::json;

    use crate::llm::{ScriptedLlmClient, TokenStream};
    use crate::workflow::WorkflowCompiler;

    fn ctx(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn settings() -> GatewaySettings {
        GatewaySettings {
            default_model: "chat".into(),
            reasoning_model: "reasoner".into(),
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout: Duration::from_secs(5),
            stream_timeout: Duration::from_secs(5),
        }
    }

    fn gateway(client: Arc<ScriptedLlmClient>) -> ModelGateway {
        ModelGateway::new(client, settings())
    }

    /// 永不返回的客户端（用于超时）
    struct HangingClient;

    #[async_trait]
    impl LlmClient for HangingClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }

        async fn complete_stream(&self, _request: &ChatRequest) -> Result<TokenStream, LlmError> {
            let tokens: Vec<Result<String, LlmError>> = vec![Ok("partial ".into())];
            Ok(Box::pin(stream::iter(tokens).chain(stream::pending())))
        }
    }

    #[tokio::test]
    async fn test_complete_uses_default_model_and_config_sampling() {
        let client = Arc::new(ScriptedLlmClient::always(Ok("Hello there".into())));
        let gw = gateway(client.clone());

        let reply = gw
            .complete("hi", &ctx(json!({"currentPage": "dashboard", "userRole": "owner"})))
            .await;
        assert_eq!(reply.content, "Hello there");
        assert_eq!(reply.content_type, ContentType::Text);

        let request = &client.requests()[0];
        assert_eq!(request.model, "chat");
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 2000);
        assert!(request.messages[0].content.contains("- Page: dashboard"));
        assert_eq!(request.last_user_content(), Some("hi"));
    }

    #[tokio::test]
    async fn test_reasoning_and_context_overrides() {
        let client = Arc::new(ScriptedLlmClient::always(Ok("```sql\nselect 1;\n```".into())));
        let gw = gateway(client.clone());

        let reply = gw
            .complete(
                "query",
                &ctx(json!({"requiresReasoning": true, "temperature": 0.1, "maxTokens": 64})),
            )
            .await;
        assert_eq!(reply.content_type, ContentType::Markdown);

        let request = &client.requests()[0];
        assert_eq!(request.model, "reasoner");
        assert!((request.temperature - 0.1).abs() < 1e-6);
        assert_eq!(request.max_tokens, 64);
    }

    #[tokio::test]
    async fn test_failure_becomes_fallback_reply() {
        let client = Arc::new(ScriptedLlmClient::failing(LlmError::Network(
            "connection refused".into(),
        )));
        let reply = gateway(client).complete("hi", &ContextMap::new()).await;
        assert!(reply.is_error());
        assert_eq!(reply.content, FALLBACK_ERROR_MESSAGE);
        assert!(!reply.content.contains("refused"));
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let client = Arc::new(ScriptedLlmClient::always(Ok("   ".into())));
        let reply = gateway(client).complete("hi", &ContextMap::new()).await;
        assert!(reply.is_error());
    }

    #[tokio::test]
    async fn test_streaming_delivers_tokens_in_order() {
        let client = Arc::new(ScriptedLlmClient::always(Ok("one two three".into())));
        let gw = gateway(client);
        let tokens = Mutex::new(Vec::new());

        let reply = gw
            .complete_streaming("count", &ContextMap::new(), |t| {
                tokens.lock().unwrap().push(t.to_string())
            })
            .await;

        assert_eq!(reply.content, "one two three");
        assert_eq!(tokens.into_inner().unwrap(), vec!["one ", "two ", "three"]);
    }

    #[tokio::test]
    async fn test_timeouts_become_fallback_reply() {
        let mut fast = settings();
        fast.request_timeout = Duration::from_millis(20);
        fast.stream_timeout = Duration::from_millis(20);
        let gw = ModelGateway::new(Arc::new(HangingClient), fast);

        assert!(gw.complete("hi", &ContextMap::new()).await.is_error());

        let mut seen = String::new();
        let reply = gw
            .complete_streaming("hi", &ContextMap::new(), |t| seen.push_str(t))
            .await;
        assert!(reply.is_error());
        assert_eq!(seen, "partial ");
    }

    #[tokio::test]
    async fn test_invoke_uses_agent_prompt_model_and_task_context() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Ok("done".into()),
            Err(LlmError::Api("429".into())),
        ]));
        let gw = gateway(client.clone());
        let graph = WorkflowCompiler::new("Persona.")
            .compile_message("hello", &ctx(json!({"workspaceName": "Acme", "maxTokens": 99})));
        let agent = &graph.agents[0];
        let task = &graph.tasks[0];

        assert_eq!(gw.invoke(agent, task, "prompt").await, Ok("done".to_string()));
        let request = &client.requests()[0];
        assert!(request.messages[0].content.starts_with("Persona."));
        assert!(request.messages[0].content.contains("- Workspace: Acme"));
        assert_eq!(request.model, "chat");
        assert_eq!(request.max_tokens, 99);

        let mut pinned = agent.clone();
        pinned.model = Some("custom-model".into());
        assert_eq!(
            gw.invoke(&pinned, task, "prompt").await,
            Err(AssistantError::Model("429".into()))
        );
        assert_eq!(client.requests()[1].model, "custom-model");
    }
}
