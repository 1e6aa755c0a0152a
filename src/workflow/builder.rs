//! 工作流构建器
//!
//! 提供流畅的 API 在代码中声明工作流；build 时按编译器的规则校验。

use serde_json::Value;

use crate::workflow::compiler::WorkflowCompiler;
use crate::workflow::types::*;

/// 工作流构建器
pub struct WorkflowBuilder {
    name: String,
    description: String,
    steps: Vec<WorkflowStep>,
    context_variables: ContextMap,
}

impl WorkflowBuilder {
    /// 创建新的工作流构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            context_variables: ContextMap::new(),
        }
    }

    /// 设置描述
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 设置工作流级上下文变量
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_variables.insert(key.into(), value.into());
        self
    }

    /// 追加一步（依赖上一步）
    pub fn step(
        mut self,
        agent_name: impl Into<String>,
        instructions: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        self.steps.push(WorkflowStep {
            agent: StepAgent {
                name: agent_name.into(),
                instructions: instructions.into(),
                model: None,
            },
            input: input.into(),
            expected_output: expected_output.into(),
            max_tokens: None,
            temperature: None,
        });
        self
    }

    /// 设置最后一步的模型
    pub fn model(mut self, model: impl Into<String>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.agent.model = Some(model.into());
        }
        self
    }

    /// 设置最后一步的 temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.temperature = Some(temperature);
        }
        self
    }

    /// 设置最后一步的 maxTokens
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.max_tokens = Some(max_tokens);
        }
        self
    }

    /// 构建工作流
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let workflow = Workflow {
            name: self.name,
            description: self.description,
            steps: self.steps,
            context_variables: self.context_variables,
        };
        WorkflowCompiler::validate_workflow(&workflow)?;
        Ok(workflow)
    }
}
