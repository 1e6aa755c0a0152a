//! Plugin 系统
//!
//! 插件以 manifest 描述：id、名称、版本（semver）、所需宿主 API 版本范围、能力列表。
//! 注册时校验：
//! - id 唯一
//! - `host_api` 与宿主 [`HOST_API_VERSION`] 兼容
//! - 声明的能力与实际提供的内容一致（工作流必须能通过编译校验）
//!
//! 插件类型（能力）：
//! - 工作流插件：提供可按名称调用的多步工作流
//! - 页面指引插件：为网关的系统提示词提供页面专属指引

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::workflow::{Workflow, WorkflowCompiler, WorkflowError};

pub use builtin::{DirectoryWorkflowsPlugin, ResearchBriefPlugin};

/// 宿主插件 API 版本
pub const HOST_API_VERSION: Version = Version::new(1, 0, 0);

/// 插件能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// 提供工作流
    Workflows,
    /// 提供页面指引
    PageGuidance,
}

/// 插件清单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// 插件唯一标识
    pub id: String,
    /// 插件名称
    pub name: String,
    /// 插件版本
    pub version: Version,
    /// 所需宿主 API 版本范围
    pub host_api: VersionReq,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl PluginManifest {
    /// 从 TOML 解析清单（plugin.toml）
    pub fn from_toml(text: &str) -> Result<Self, PluginError> {
        toml::from_str(text).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// 插件 trait
pub trait AssistantPlugin: Send + Sync {
    /// 获取插件清单
    fn manifest(&self) -> &PluginManifest;

    /// 提供的工作流
    fn workflows(&self) -> Vec<Workflow> {
        Vec::new()
    }

    /// 提供的页面指引：(页面名, 指引)
    fn page_guidance(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// 插件错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Workflow name already registered: {0}")]
    DuplicateWorkflow(String),

    #[error("Plugin {id} requires host API {required}, host provides {host}")]
    IncompatibleHostApi {
        id: String,
        required: VersionReq,
        host: Version,
    },

    #[error("Plugin {id} capability mismatch: {reason}")]
    CapabilityMismatch { id: String, reason: String },

    #[error("Plugin {id} provides an invalid workflow {workflow}: {source}")]
    InvalidWorkflow {
        id: String,
        workflow: String,
        source: WorkflowError,
    },

    #[error("Invalid plugin manifest: {0}")]
    InvalidManifest(String),
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    /// 注册顺序
    plugins: Vec<Arc<dyn AssistantPlugin>>,
    /// 工作流名 -> (插件 id, 工作流)
    workflows: HashMap<String, (String, Workflow)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件；校验失败时注册表不变
    pub fn register(&mut self, plugin: Arc<dyn AssistantPlugin>) -> Result<(), PluginError> {
        let manifest = plugin.manifest();
        let id = manifest.id.clone();

        if self.plugins.iter().any(|p| p.manifest().id == id) {
            return Err(PluginError::AlreadyRegistered(id));
        }

        if !manifest.host_api.matches(&HOST_API_VERSION) {
            return Err(PluginError::IncompatibleHostApi {
                id,
                required: manifest.host_api.clone(),
                host: HOST_API_VERSION,
            });
        }

        let workflows = plugin.workflows();
        check_capability(&id, manifest, Capability::Workflows, !workflows.is_empty())?;
        check_capability(
            &id,
            manifest,
            Capability::PageGuidance,
            !plugin.page_guidance().is_empty(),
        )?;

        for workflow in &workflows {
            WorkflowCompiler::validate_workflow(workflow).map_err(|source| {
                PluginError::InvalidWorkflow {
                    id: id.clone(),
                    workflow: workflow.name.clone(),
                    source,
                }
            })?;
            if self.workflows.contains_key(&workflow.name) {
                return Err(PluginError::DuplicateWorkflow(workflow.name.clone()));
            }
        }

        for workflow in workflows {
            self.workflows
                .insert(workflow.name.clone(), (id.clone(), workflow));
        }
        tracing::info!(plugin = %id, version = %manifest.version, "Registered plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    /// 按名称查找工作流
    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name).map(|(_, workflow)| workflow)
    }

    /// 所有工作流名（排序）
    pub fn workflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// 所有插件提供的页面指引（按注册顺序，后注册的覆盖先注册的）
    pub fn page_guidance(&self) -> Vec<(String, String)> {
        self.plugins
            .iter()
            .filter(|p| p.manifest().has(Capability::PageGuidance))
            .flat_map(|p| p.page_guidance())
            .collect()
    }

    pub fn manifests(&self) -> Vec<&PluginManifest> {
        self.plugins.iter().map(|p| p.manifest()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// 声明与实际必须一致：声明了就要提供，提供了就要声明
fn check_capability(
    id: &str,
    manifest: &PluginManifest,
    capability: Capability,
    provided: bool,
) -> Result<(), PluginError> {
    match (manifest.has(capability), provided) {
        (true, false) => Err(PluginError::CapabilityMismatch {
            id: id.to_string(),
            reason: format!("declares {:?} but provides none", capability),
        }),
        (false, true) => Err(PluginError::CapabilityMismatch {
            id: id.to_string(),
            reason: format!("provides {:?} without declaring it", capability),
        }),
        _ => Ok(()),
    }
}
