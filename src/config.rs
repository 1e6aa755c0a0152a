//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NECTAR__*` 覆盖（双下划线表示嵌套，如 `NECTAR__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// [app] 段：应用名、助手基础人设、工作流定义目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单消息编译时 assistant 的基础人设
    #[serde(default = "default_persona")]
    pub persona: String,
    /// 工作流定义文件目录（*.toml / *.json），未设置时不加载
    pub workflows_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            persona: default_persona(),
            workflows_dir: None,
        }
    }
}

pub fn default_persona() -> String {
    "You are a helpful assistant embedded in a collaborative workspace platform. \
     Answer clearly and concisely, and use Markdown when it helps readability."
        .to_string()
}

/// [llm] 段：后端选择、模型变体、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 默认模型（未设置时按后端取默认值）
    pub model: Option<String>,
    /// 推理模型（context.requiresReasoning 时使用）
    pub reasoning_model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub deepseek: LlmProviderSection,
    #[serde(default)]
    pub openai: LlmProviderSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            reasoning_model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            deepseek: LlmProviderSection::default(),
            openai: LlmProviderSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

/// [llm.deepseek] / [llm.openai]：后端专属的模型覆盖
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmProviderSection {
    pub model: Option<String>,
    pub reasoning_model: Option<String>,
}

/// [llm.timeouts]（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            stream: default_stream_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_stream_timeout() -> u64 {
    120
}

/// 会话忙时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// 立即返回错误消息，不修改对话
    #[default]
    Reject,
    /// 排队等待上一次发送结束
    Queue,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionSection {
    #[serde(default)]
    pub busy_policy: BusyPolicy,
    /// 编译出的任务图是否带 verbose 标记（执行器按任务输出 debug 日志）
    #[serde(default)]
    pub verbose: bool,
}

/// 从 config 目录加载配置，环境变量 NECTAR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NECTAR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NECTAR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
