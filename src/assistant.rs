//! 助手构建器：统一的组件初始化逻辑
//!
//! 进程内只构建一次网关、编译器、执行器与插件注册表，再以 Arc 注入每个会话。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{load_config, AppConfig};
use crate::core::AssistantError;
use crate::gateway::{GatewaySettings, ModelGateway, PromptBuilder};
use crate::llm::{create_llm_from_config, ProviderSelection};
use crate::plugins::{AssistantPlugin, DirectoryWorkflowsPlugin, PluginRegistry, ResearchBriefPlugin};
use crate::session::ConversationSession;
use crate::workflow::{TaskGraphExecutor, Workflow, WorkflowCompiler, WorkflowLoader};

/// 助手构建器
pub struct AssistantBuilder {
    config: AppConfig,
    provider: Option<ProviderSelection>,
    plugins: Vec<Arc<dyn AssistantPlugin>>,
    builtin_plugins: bool,
}

impl AssistantBuilder {
    /// 创建新的构建器
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            provider: None,
            plugins: Vec::new(),
            builtin_plugins: true,
        }
    }

    /// 指定 LLM 后端（未指定时按配置与环境变量选择）
    pub fn with_provider(mut self, provider: ProviderSelection) -> Self {
        self.provider = Some(provider);
        self
    }

    /// 追加插件
    pub fn with_plugin(mut self, plugin: Arc<dyn AssistantPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// 是否注册内置插件
    pub fn with_builtin_plugins(mut self, enable: bool) -> Self {
        self.builtin_plugins = enable;
        self
    }

    /// 构建插件注册表：内置插件、工作流目录、调用方插件；注册失败的插件跳过
    fn build_plugin_registry(&mut self) -> PluginRegistry {
        let mut candidates: Vec<Arc<dyn AssistantPlugin>> = Vec::new();
        if self.builtin_plugins {
            candidates.push(Arc::new(ResearchBriefPlugin::new()));
        }

        if let Some(dir) = &self.config.app.workflows_dir {
            match WorkflowLoader::new(dir).load_all() {
                Ok(workflows) if !workflows.is_empty() => {
                    candidates.push(Arc::new(DirectoryWorkflowsPlugin::new(workflows)));
                }
                Ok(_) => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to read workflows dir"),
            }
        }
        candidates.append(&mut self.plugins);

        let mut registry = PluginRegistry::new();
        for plugin in candidates {
            let id = plugin.manifest().id.clone();
            if let Err(e) = registry.register(plugin) {
                warn!(plugin = %id, error = %e, "Plugin skipped");
            }
        }
        registry
    }

    /// 构建助手
    pub fn build(mut self) -> Assistant {
        let plugins = self.build_plugin_registry();
        let provider = match self.provider.take() {
            Some(provider) => provider,
            None => create_llm_from_config(&self.config),
        };

        let prompts = plugins
            .page_guidance()
            .into_iter()
            .fold(PromptBuilder::new(), |builder, (page, guidance)| {
                builder.with_page_guidance(page, guidance)
            });
        let settings = GatewaySettings::from_config(&self.config, &provider);
        let gateway = Arc::new(ModelGateway::new(provider.client, settings).with_prompt_builder(prompts));

        let compiler = Arc::new(
            WorkflowCompiler::new(self.config.app.persona.clone()).with_verbose(self.config.session.verbose),
        );
        let executor = Arc::new(TaskGraphExecutor::new(gateway.clone()));

        info!(
            plugins = plugins.len(),
            workflows = plugins.workflow_names().len(),
            "Assistant ready"
        );

        Assistant {
            config: self.config,
            gateway,
            compiler,
            executor,
            plugins: Arc::new(plugins),
        }
    }
}

/// 已装配的助手组件
pub struct Assistant {
    config: AppConfig,
    gateway: Arc<ModelGateway>,
    compiler: Arc<WorkflowCompiler>,
    executor: Arc<TaskGraphExecutor>,
    plugins: Arc<PluginRegistry>,
}

impl Assistant {
    /// 新建一个会话（共享组件）
    pub fn new_session(&self) -> ConversationSession {
        ConversationSession::new(
            Arc::clone(&self.compiler),
            Arc::clone(&self.executor),
            self.config.session.busy_policy,
        )
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.plugins.workflow(name)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 加载配置并构建助手
pub fn create_assistant(config_path: Option<PathBuf>) -> Result<Assistant, AssistantError> {
    let config = load_config(config_path).map_err(|e| AssistantError::Config(e.to_string()))?;
    Ok(AssistantBuilder::new(config).build())
}
