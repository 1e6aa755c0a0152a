//! 内置插件
//!
//! - ResearchBriefPlugin：三步 research-brief 工作流 + research 页面指引
//! - DirectoryWorkflowsPlugin：把工作流目录中加载的定义包装为插件

use semver::{Version, VersionReq};

use crate::plugins::{AssistantPlugin, Capability, PluginManifest};
use crate::workflow::{Workflow, WorkflowBuilder, WorkflowError};

pub const RESEARCH_BRIEF_WORKFLOW: &str = "research-brief";

/// 调研简报插件
pub struct ResearchBriefPlugin {
    manifest: PluginManifest,
}

impl ResearchBriefPlugin {
    pub fn new() -> Self {
        Self {
            manifest: PluginManifest {
                id: "builtin.research-brief".to_string(),
                name: "Research Brief".to_string(),
                version: Version::new(1, 0, 0),
                host_api: VersionReq::STAR,
                description: "Researches a topic, drafts a brief, then reviews it".to_string(),
                capabilities: vec![Capability::Workflows, Capability::PageGuidance],
            },
        }
    }

    fn research_brief() -> Result<Workflow, WorkflowError> {
        WorkflowBuilder::new(RESEARCH_BRIEF_WORKFLOW)
            .description("Research a topic and produce a reviewed one-page brief")
            .context("format", "markdown")
            .step(
                "Researcher",
                "You are a meticulous researcher. List the key facts, open questions and \
                 trade-offs for the topic. Do not write prose yet.",
                "Research the topic in the user's request.",
                "A bullet list of key facts and open questions",
            )
            .temperature(0.3)
            .step(
                "Writer",
                "You are a concise technical writer. Turn research notes into a one-page \
                 brief with a summary, findings and recommendations.",
                "Write a brief from the research notes.",
                "A one-page Markdown brief",
            )
            .max_tokens(1200)
            .step(
                "Reviewer",
                "You are a critical reviewer. Fix factual gaps and unclear wording, and \
                 return the final brief only.",
                "Review and finalize the brief.",
                "The final brief",
            )
            .temperature(0.2)
            .build()
    }
}

impl Default for ResearchBriefPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantPlugin for ResearchBriefPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn workflows(&self) -> Vec<Workflow> {
        match Self::research_brief() {
            Ok(workflow) => vec![workflow],
            Err(e) => {
                tracing::warn!(error = %e, "Built-in research-brief workflow is invalid");
                Vec::new()
            }
        }
    }

    fn page_guidance(&self) -> Vec<(String, String)> {
        vec![(
            "research".to_string(),
            "The user is on the research page. Offer the research-brief workflow for \
             multi-step research requests."
                .to_string(),
        )]
    }
}

/// 工作流目录插件：承载 WorkflowLoader 加载的定义
pub struct DirectoryWorkflowsPlugin {
    manifest: PluginManifest,
    workflows: Vec<Workflow>,
}

impl DirectoryWorkflowsPlugin {
    pub fn new(workflows: Vec<Workflow>) -> Self {
        Self {
            manifest: PluginManifest {
                id: "local.workflows-dir".to_string(),
                name: "Workflow definitions".to_string(),
                version: Version::new(1, 0, 0),
                host_api: VersionReq::STAR,
                description: "Workflows loaded from the configured directory".to_string(),
                capabilities: vec![Capability::Workflows],
            },
            workflows,
        }
    }
}

impl AssistantPlugin for DirectoryWorkflowsPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn workflows(&self) -> Vec<Workflow> {
        self.workflows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginRegistry;
    use crate::workflow::{ContextMap, WorkflowCompiler};
    use std::sync::Arc;

    #[test]
    fn test_research_brief_registers_and_compiles() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(ResearchBriefPlugin::new())).unwrap();

        let workflow = registry.workflow(RESEARCH_BRIEF_WORKFLOW).unwrap();
        assert_eq!(workflow.steps.len(), 3);

        let graph = WorkflowCompiler::default()
            .compile_workflow(workflow, &ContextMap::new())
            .unwrap();
        assert_eq!(graph.tasks[2].dependencies, vec!["task_1"]);
        assert_eq!(graph.tasks[1].context_data["maxTokens"], 1200);
        assert_eq!(graph.tasks[0].context_data["format"], "markdown");
        assert_eq!(registry.page_guidance()[0].0, "research");
    }

    #[test]
    fn test_directory_plugin_without_workflows_is_rejected() {
        let mut registry = PluginRegistry::new();
        assert!(registry
            .register(Arc::new(DirectoryWorkflowsPlugin::new(Vec::new())))
            .is_err());
    }
}
