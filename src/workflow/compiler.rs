//! 工作流编译器
//!
//! 把单条消息或声明式 Workflow 编译为可执行的 TaskGraph：
//! - 单消息：一个 `assistant` Agent + 一个 `respond` 任务
//! - 工作流：N 步编译为 `agent_i` / `task_i`，task_i 依赖 task_{i-1}（线性链）
//!
//! 所有校验在编译期完成，校验失败不会发起任何模型调用。

use serde_json::Value;

use crate::config::default_persona;
use crate::workflow::types::*;

pub const ASSISTANT_AGENT_ID: &str = "assistant";
pub const RESPOND_TASK_ID: &str = "respond";

/// 上下文中可选的人设补充字段
const CTX_MODULE_NAME: &str = "moduleName";
const CTX_USER_NAME: &str = "userName";
const CTX_TASK_TYPE: &str = "taskType";

/// 工作流编译器
#[derive(Debug, Clone)]
pub struct WorkflowCompiler {
    /// 单消息 assistant 的基础人设
    persona: String,
    /// 编译出的图是否带 verbose 标记
    verbose: bool,
}

impl WorkflowCompiler {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// 有工作流时编译工作流，否则编译单消息
    pub fn compile_request(
        &self,
        message: &str,
        workflow: Option<&Workflow>,
        context: &ContextMap,
    ) -> Result<TaskGraph, WorkflowError> {
        match workflow {
            Some(workflow) => self.compile_workflow(workflow, context),
            None => Ok(self.compile_message(message, context)),
        }
    }

    /// 单消息编译：恰好一个 Agent、一个无依赖任务
    pub fn compile_message(&self, message: &str, context: &ContextMap) -> TaskGraph {
        let agent = Agent {
            id: ASSISTANT_AGENT_ID.to_string(),
            name: "Assistant".to_string(),
            description: "General-purpose workspace assistant".to_string(),
            system_prompt: self.build_instructions(context),
            model: None,
            tools: Vec::new(),
        };

        let task = Task {
            id: RESPOND_TASK_ID.to_string(),
            description: format!("Respond to the following user message:\n\n{}", message),
            agent_id: agent.id.clone(),
            expected_output: "A helpful, accurate response to the user's message.".to_string(),
            context_data: context.clone(),
            dependencies: Vec::new(),
            input_embedded: true,
        };

        TaskGraph {
            id: new_graph_id(),
            name: "single-message".to_string(),
            description: "Respond to a single user message".to_string(),
            agents: vec![agent],
            tasks: vec![task],
            process: ProcessMode::Sequential,
            verbose: self.verbose,
        }
    }

    /// 工作流编译：N 步 -> N 个 Agent + N 个线性依赖的任务
    pub fn compile_workflow(
        &self,
        workflow: &Workflow,
        global_context: &ContextMap,
    ) -> Result<TaskGraph, WorkflowError> {
        Self::validate_workflow(workflow)?;

        let total = workflow.steps.len();
        let mut agents = Vec::with_capacity(total);
        let mut tasks = Vec::with_capacity(total);

        for (index, step) in workflow.steps.iter().enumerate() {
            let agent_id = format!("agent_{}", index);
            agents.push(Agent {
                id: agent_id.clone(),
                name: step.agent.name.clone(),
                description: format!("{} (step {} of {})", workflow.name, index + 1, total),
                system_prompt: step.agent.instructions.clone(),
                model: step.agent.model.clone(),
                tools: Vec::new(),
            });

            let dependencies = if index == 0 {
                Vec::new()
            } else {
                vec![format!("task_{}", index - 1)]
            };

            tasks.push(Task {
                id: format!("task_{}", index),
                description: step.input.clone(),
                agent_id,
                expected_output: step.expected_output.clone(),
                context_data: merge_context(global_context, &workflow.context_variables, step),
                dependencies,
                input_embedded: false,
            });
        }

        let graph = TaskGraph {
            id: new_graph_id(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            agents,
            tasks,
            process: ProcessMode::Sequential,
            verbose: self.verbose,
        };
        graph.validate()?;

        tracing::debug!(workflow = %workflow.name, steps = total, "Compiled workflow");
        Ok(graph)
    }

    /// 声明层校验：至少一步，每步 Agent 名称 / 指令 / 输入非空，采样参数合法
    pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
        if workflow.name.trim().is_empty() {
            return Err(WorkflowError::InvalidConfiguration(
                "workflow name is required".to_string(),
            ));
        }
        if workflow.steps.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        for (index, step) in workflow.steps.iter().enumerate() {
            let invalid = |reason: &str| WorkflowError::InvalidStep {
                index,
                reason: reason.to_string(),
            };
            if step.agent.name.trim().is_empty() {
                return Err(invalid("agent name is required"));
            }
            if step.agent.instructions.trim().is_empty() {
                return Err(invalid("agent instructions are required"));
            }
            if step.input.trim().is_empty() {
                return Err(invalid("input is required"));
            }
            if let Some(t) = step.temperature {
                if !t.is_finite() || !(0.0..=2.0).contains(&t) {
                    return Err(invalid("temperature must be between 0 and 2"));
                }
            }
            if step.max_tokens == Some(0) {
                return Err(invalid("maxTokens must be positive"));
            }
        }
        Ok(())
    }

    /// 基础人设 + 可选的模块 / 用户 / 任务说明
    fn build_instructions(&self, context: &ContextMap) -> String {
        let mut instructions = if self.persona.trim().is_empty() {
            default_persona()
        } else {
            self.persona.clone()
        };

        if let Some(module) = context_str(context, CTX_MODULE_NAME) {
            instructions.push_str(&format!(
                "\nYou are currently helping with the \"{}\" module.",
                module
            ));
        }
        if let Some(user) = context_str(context, CTX_USER_NAME) {
            instructions.push_str(&format!("\nThe user's name is {}.", user));
        }
        if let Some(task_type) = context_str(context, CTX_TASK_TYPE) {
            instructions.push_str(&format!(
                "\nThe user is working on a {} task; tailor the answer to it.",
                task_type
            ));
        }
        instructions
    }
}

impl Default for WorkflowCompiler {
    fn default() -> Self {
        Self::new(default_persona())
    }
}

/// 上下文合并：global < workflow.contextVariables < 步骤级 temperature / maxTokens
///
/// 步骤未设置 temperature / maxTokens 时删除该键（步骤级总是覆盖前面的来源）。
pub fn merge_context(
    global: &ContextMap,
    workflow_variables: &ContextMap,
    step: &WorkflowStep,
) -> ContextMap {
    let mut merged = global.clone();
    for (key, value) in workflow_variables {
        merged.insert(key.clone(), value.clone());
    }

    match step.temperature {
        Some(t) => {
            merged.insert(CTX_TEMPERATURE.to_string(), Value::from(f64::from(t)));
        }
        None => {
            merged.remove(CTX_TEMPERATURE);
        }
    }
    match step.max_tokens {
        Some(n) => {
            merged.insert(CTX_MAX_TOKENS.to_string(), Value::from(n));
        }
        None => {
            merged.remove(CTX_MAX_TOKENS);
        }
    }
    merged
}

fn context_str<'a>(context: &'a ContextMap, key: &str) -> Option<&'a str> {
    context
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn new_graph_id() -> String {
    format!("graph_{}", uuid::Uuid::new_v4())
}
