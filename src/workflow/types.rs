//! 工作流类型定义
//!
//! 两层结构：
//! - 声明层：Workflow / WorkflowStep（由调用方或插件提供）
//! - 执行层：TaskGraph / Agent / Task（由 WorkflowCompiler 编译得到，交给执行器运行）
//!
//! 线上格式统一为 camelCase，与调用方 UI 的上下文键保持一致。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::AssistantError;
use crate::workflow::graph::WorkflowGraph;

pub type TaskId = String;
pub type AgentId = String;

/// 调用方传入的上下文（map<string, any>）
pub type ContextMap = serde_json::Map<String, Value>;

/// 上下文中的 temperature 键
pub const CTX_TEMPERATURE: &str = "temperature";
/// 上下文中的 maxTokens 键
pub const CTX_MAX_TOKENS: &str = "maxTokens";

/// 任务图中的 Agent：一个带系统提示词与模型的角色
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    /// None 表示由网关按上下文选择（默认 / 推理变体）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// 任务：绑定到某个 Agent 的一个工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub context_data: ContextMap,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// description 已包含用户原始请求，执行器不再追加
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub input_embedded: bool,
}

/// 执行模式（目前只有顺序执行）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    #[default]
    Sequential,
}

/// 可执行的任务图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGraph {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub process: ProcessMode,
    #[serde(default)]
    pub verbose: bool,
}

impl TaskGraph {
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// 结构校验：id 唯一、Agent 引用存在、依赖存在且无环
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.tasks.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.agents {
            if !agent_ids.insert(agent.id.as_str()) {
                return Err(WorkflowError::DuplicateId(agent.id.clone()));
            }
        }

        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(WorkflowError::DuplicateId(task.id.clone()));
            }
        }

        for task in &self.tasks {
            if !agent_ids.contains(task.agent_id.as_str()) {
                return Err(WorkflowError::UnknownAgent {
                    task_id: task.id.clone(),
                    agent_id: task.agent_id.clone(),
                });
            }
            for dep in &task.dependencies {
                if dep == &task.id || !task_ids.contains(dep.as_str()) {
                    return Err(WorkflowError::UnknownDependency {
                        task_id: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        WorkflowGraph::new(&self.tasks).topological_order()?;
        Ok(())
    }

    /// 顺序执行计划：校验后按拓扑序返回任务；存在分支（多依赖 / 多后继）时拒绝
    pub fn execution_order(&self) -> Result<Vec<&Task>, WorkflowError> {
        self.validate()?;
        let graph = WorkflowGraph::new(&self.tasks);
        if let Some(task_id) = graph.first_branching_task() {
            return Err(WorkflowError::UnsupportedBranching(task_id));
        }
        let order = graph.topological_order()?;
        Ok(order.iter().filter_map(|id| self.task(id)).collect())
    }
}

/// 任务执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 跳过（前置任务失败或已取消）
    Skipped,
}

/// 工作流定义：多步骤声明，编译为线性任务链
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub context_variables: ContextMap,
}

/// 工作流中的一步
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub agent: StepAgent,
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// 步骤中声明的 Agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAgent {
    pub name: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// 工作流错误类型（编译期 / 配置错误）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow has no steps")]
    EmptyWorkflow,
    #[error("Invalid step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
    #[error("Task {task_id} references unknown agent {agent_id}")]
    UnknownAgent { task_id: TaskId, agent_id: AgentId },
    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: TaskId, dependency: TaskId },
    #[error("Duplicate id: {0}")]
    DuplicateId(String),
    #[error("Cyclic dependency detected")]
    CyclicDependency,
    #[error("Task {0} branches; only linear chains can be scheduled")]
    UnsupportedBranching(TaskId),
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<WorkflowError> for AssistantError {
    fn from(err: WorkflowError) -> Self {
        AssistantError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            system_prompt: "sys".to_string(),
            model: None,
            tools: Vec::new(),
        }
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            description: format!("do {}", id),
            agent_id: "a".to_string(),
            expected_output: String::new(),
            context_data: ContextMap::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            input_embedded: false,
        }
    }

    fn graph(tasks: Vec<Task>) -> TaskGraph {
        TaskGraph {
            id: "g".into(),
            name: "g".into(),
            description: String::new(),
            agents: vec![agent("a")],
            tasks,
            process: ProcessMode::Sequential,
            verbose: false,
        }
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let g = graph(vec![task("t1", &["missing"])]);
        assert_eq!(
            g.validate(),
            Err(WorkflowError::UnknownDependency {
                task_id: "t1".into(),
                dependency: "missing".into()
            })
        );
    }

    #[test]
    fn test_validate_rejects_unknown_agent() {
        let mut t = task("t1", &[]);
        t.agent_id = "ghost".into();
        assert!(matches!(
            graph(vec![t]).validate(),
            Err(WorkflowError::UnknownAgent { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_cycle_and_duplicates() {
        let g = graph(vec![task("t1", &["t2"]), task("t2", &["t1"])]);
        assert_eq!(g.validate(), Err(WorkflowError::CyclicDependency));

        let g = graph(vec![task("t1", &[]), task("t1", &[])]);
        assert_eq!(g.validate(), Err(WorkflowError::DuplicateId("t1".into())));
    }

    #[test]
    fn test_execution_order_follows_dependencies_not_list_order() {
        let g = graph(vec![task("c", &["b"]), task("a", &[]), task("b", &["a"])]);
        let order: Vec<&str> = g
            .execution_order()
            .unwrap()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_execution_order_rejects_branching() {
        let g = graph(vec![task("a", &[]), task("b", &["a"]), task("c", &["a"])]);
        assert_eq!(
            g.execution_order().err(),
            Some(WorkflowError::UnsupportedBranching("a".into()))
        );
    }

    #[test]
    fn test_execution_order_rejects_disconnected_roots() {
        let g = graph(vec![task("a", &[]), task("b", &[])]);
        assert_eq!(
            g.execution_order().err(),
            Some(WorkflowError::UnsupportedBranching("b".into()))
        );
    }

    #[test]
    fn test_graph_wire_format_is_camel_case() {
        let json = serde_json::to_value(graph(vec![task("t1", &[])])).unwrap();
        assert_eq!(json["process"], "sequential");
        assert_eq!(json["tasks"][0]["agentId"], "a");
        assert!(json["agents"][0].get("systemPrompt").is_some());
        assert!(json["agents"][0].get("model").is_none());
    }

    #[test]
    fn test_workflow_deserializes_from_wire_format() {
        let wf: Workflow = serde_json::from_value(serde_json::json!({
            "name": "wf",
            "steps": [{
                "agent": {"name": "A", "instructions": "be A"},
                "input": "go",
                "expectedOutput": "done",
                "maxTokens": 300
            }],
            "contextVariables": {"tone": "formal"}
        }))
        .unwrap();
        assert_eq!(wf.steps[0].max_tokens, Some(300));
        assert_eq!(wf.steps[0].temperature, None);
        assert_eq!(wf.context_variables["tone"], "formal");
    }
}
