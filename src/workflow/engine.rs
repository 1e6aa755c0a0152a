//! 任务图执行器
//!
//! 按依赖顺序逐个执行任务（顺序模式），每个任务通过 AgentInvoker 调用其 Agent；
//! 流式运行时每完成一个任务发出 Progress，最后发出恰好一个 Complete 或 Error。
//! 任务失败不会让运行本身报错：返回降级的 final_output，并通过 Error 事件告知调用方。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{AssistantError, FALLBACK_ERROR_MESSAGE};
use crate::stream::ExecutorEvent;
use crate::workflow::types::*;

/// 执行器调用 Agent 的接缝（生产环境由 ModelGateway 实现）
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// 让 agent 执行 task，prompt 为执行器拼好的任务提示
    async fn invoke(&self, agent: &Agent, task: &Task, prompt: &str) -> Result<String, AssistantError>;
}

/// 单个任务的执行记录
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub state: TaskState,
    pub output: Option<String>,
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// 最后一个任务的输出；失败时为降级输出（最后一次成功输出或兜底文案）
    pub final_output: String,
    /// 按执行顺序的任务记录
    pub tasks: Vec<TaskRecord>,
    /// 导致运行中止的错误
    pub error: Option<AssistantError>,
}

impl RunOutput {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.tasks.iter().find(|r| r.task_id == task_id).map(|r| r.state)
    }
}

/// 任务图执行器
pub struct TaskGraphExecutor {
    invoker: Arc<dyn AgentInvoker>,
}

impl TaskGraphExecutor {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }

    /// 非流式运行
    pub async fn run(
        &self,
        graph: &TaskGraph,
        initial_input: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutput, WorkflowError> {
        self.execute(graph, initial_input, cancel, None).await
    }

    /// 流式运行：事件写入 sink，返回时 sink 随之关闭
    pub async fn run_streaming(
        &self,
        graph: &TaskGraph,
        initial_input: &str,
        cancel: CancellationToken,
        sink: mpsc::UnboundedSender<ExecutorEvent>,
    ) -> Result<RunOutput, WorkflowError> {
        self.execute(graph, initial_input, cancel, Some(&sink)).await
    }

    async fn execute(
        &self,
        graph: &TaskGraph,
        initial_input: &str,
        cancel: CancellationToken,
        sink: Option<&mpsc::UnboundedSender<ExecutorEvent>>,
    ) -> Result<RunOutput, WorkflowError> {
        let emit = |event: ExecutorEvent| {
            if let Some(tx) = sink {
                // 接收端已关闭时静默丢弃
                let _ = tx.send(event);
            }
        };

        let order = match graph.execution_order() {
            Ok(order) => order,
            Err(e) => {
                warn!(graph_id = %graph.id, error = %e, "Task graph rejected");
                emit(ExecutorEvent::Error {
                    error: FALLBACK_ERROR_MESSAGE.to_string(),
                });
                return Err(e);
            }
        };

        let total = order.len();
        info!(graph_id = %graph.id, graph = %graph.name, tasks = total, "Task graph run started");

        let mut outputs: HashMap<TaskId, String> = HashMap::new();
        let mut records: Vec<TaskRecord> = Vec::with_capacity(total);
        let mut last_output: Option<String> = None;
        let mut failure: Option<AssistantError> = None;

        for (index, task) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                failure = Some(AssistantError::Cancelled);
                break;
            }

            let Some(agent) = graph.agent(&task.agent_id) else {
                failure = Some(AssistantError::Execution {
                    task_id: task.id.clone(),
                    reason: format!("unknown agent {}", task.agent_id),
                });
                break;
            };

            let prompt = build_task_prompt(task, initial_input, &outputs);
            if graph.verbose {
                debug!(task_id = %task.id, agent = %agent.name, prompt_len = prompt.len(), "Task started");
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AssistantError::Cancelled),
                r = self.invoker.invoke(agent, task, &prompt) => r,
            };

            match result {
                Ok(output) => {
                    if graph.verbose {
                        debug!(task_id = %task.id, output_len = output.len(), "Task completed");
                    }
                    emit(ExecutorEvent::Progress {
                        task_id: task.id.clone(),
                        message: progress_summary(index, total, agent, task),
                    });
                    records.push(TaskRecord {
                        task_id: task.id.clone(),
                        state: TaskState::Completed,
                        output: Some(output.clone()),
                    });
                    outputs.insert(task.id.clone(), output.clone());
                    last_output = Some(output);
                }
                Err(err) => {
                    warn!(graph_id = %graph.id, task_id = %task.id, error = %err, "Task failed");
                    records.push(TaskRecord {
                        task_id: task.id.clone(),
                        state: TaskState::Failed,
                        output: None,
                    });
                    failure = Some(match err {
                        AssistantError::Cancelled => AssistantError::Cancelled,
                        other => AssistantError::Execution {
                            task_id: task.id.clone(),
                            reason: other.to_string(),
                        },
                    });
                    break;
                }
            }
        }

        // 未执行到的任务标记为跳过
        for task in order.iter().skip(records.len()) {
            records.push(TaskRecord {
                task_id: task.id.clone(),
                state: TaskState::Skipped,
                output: None,
            });
        }

        let final_output = match &failure {
            None => {
                let result = last_output.unwrap_or_default();
                emit(ExecutorEvent::Complete {
                    result: result.clone(),
                });
                info!(graph_id = %graph.id, "Task graph run completed");
                result
            }
            Some(err) => {
                emit(ExecutorEvent::Error {
                    error: err.user_message().to_string(),
                });
                info!(graph_id = %graph.id, error = %err, "Task graph run ended with error");
                last_output
                    .filter(|o| !o.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
            }
        };

        Ok(RunOutput {
            final_output,
            tasks: records,
            error: failure,
        })
    }
}

/// 任务提示：描述 + 期望输出 + 原始请求（根任务）+ 上游输出
fn build_task_prompt(task: &Task, initial_input: &str, outputs: &HashMap<TaskId, String>) -> String {
    let mut prompt = task.description.clone();

    if !task.expected_output.trim().is_empty() {
        prompt.push_str("\n\nExpected output: ");
        prompt.push_str(&task.expected_output);
    }

    if task.dependencies.is_empty() && !task.input_embedded && !initial_input.trim().is_empty() {
        prompt.push_str("\n\nUser request:\n");
        prompt.push_str(initial_input);
    }

    for dep in &task.dependencies {
        if let Some(output) = outputs.get(dep) {
            prompt.push_str(&format!("\n\nOutput from {}:\n{}", dep, output));
        }
    }
    prompt
}

/// 进度摘要（一行）
fn progress_summary(index: usize, total: usize, agent: &Agent, task: &Task) -> String {
    let headline = if task.expected_output.trim().is_empty() {
        truncate(&task.description, 80)
    } else {
        truncate(&task.expected_output, 80)
    };
    format!("[{}/{}] {} finished: {}\n", index + 1, total, agent.name, headline)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
