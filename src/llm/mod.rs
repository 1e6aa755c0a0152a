//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use traits::{ChatMessage, ChatRequest, ChatRole, LlmClient, LlmError, TokenStream};

use crate::config::AppConfig;

const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENAI_REASONING_MODEL: &str = "o3-mini";

/// 选定的后端：客户端 + 默认 / 推理两个模型变体
pub struct ProviderSelection {
    pub client: Arc<dyn LlmClient>,
    pub default_model: String,
    pub reasoning_model: String,
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> ProviderSelection {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = provider != "mock"
        && (std::env::var("DEEPSEEK_API_KEY").is_ok()
            || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok()));
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok()
        && provider != "deepseek"
        && provider != "mock";

    if use_deepseek {
        let default_model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .or_else(|| cfg.llm.model.clone())
            .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
        let reasoning_model = cfg
            .llm
            .deepseek
            .reasoning_model
            .clone()
            .or_else(|| cfg.llm.reasoning_model.clone())
            .unwrap_or_else(|| DEEPSEEK_REASONER.to_string());
        tracing::info!("Using DeepSeek LLM ({} / {})", default_model, reasoning_model);
        ProviderSelection {
            client: Arc::new(create_deepseek_client()),
            default_model,
            reasoning_model,
        }
    } else if use_openai {
        let default_model = cfg
            .llm
            .openai
            .model
            .clone()
            .or_else(|| cfg.llm.model.clone())
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        let reasoning_model = cfg
            .llm
            .openai
            .reasoning_model
            .clone()
            .or_else(|| cfg.llm.reasoning_model.clone())
            .unwrap_or_else(|| OPENAI_REASONING_MODEL.to_string());
        tracing::info!("Using OpenAI LLM ({} / {})", default_model, reasoning_model);
        ProviderSelection {
            client: Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )),
            default_model,
            reasoning_model,
        }
    } else {
        if provider != "mock" {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
        }
        ProviderSelection {
            client: Arc::new(MockLlmClient),
            default_model: cfg.llm.model.clone().unwrap_or_else(|| "mock".to_string()),
            reasoning_model: cfg
                .llm
                .reasoning_model
                .clone()
                .unwrap_or_else(|| "mock-reasoner".to_string()),
        }
    }
}
