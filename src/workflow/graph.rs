//! 任务依赖图
//!
//! 使用邻接表和入度表实现 DAG 拓扑排序；同层并列时按任务在图中的声明顺序出队，保证结果确定。

use std::collections::{HashMap, VecDeque};

use crate::workflow::types::*;

/// 任务依赖图
pub struct WorkflowGraph {
    /// 邻接表：任务 ID -> 依赖该任务的任务列表
    pub adjacency: HashMap<TaskId, Vec<TaskId>>,
    /// 入度表：任务 ID -> 未完成的依赖数
    pub in_degree: HashMap<TaskId, usize>,
    /// 声明顺序
    order: Vec<TaskId>,
    /// 每个任务的直接依赖数
    dependency_counts: HashMap<TaskId, usize>,
}

impl WorkflowGraph {
    /// 创建依赖图（依赖引用的合法性由 TaskGraph::validate 负责）
    pub fn new(tasks: &[Task]) -> Self {
        let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        let mut dependency_counts = HashMap::new();

        for task in tasks {
            in_degree.insert(task.id.clone(), 0);
            adjacency.insert(task.id.clone(), Vec::new());
        }

        for task in tasks {
            for dep_id in &task.dependencies {
                adjacency.entry(dep_id.clone()).or_default().push(task.id.clone());
                *in_degree.entry(task.id.clone()).or_insert(0) += 1;
            }
            dependency_counts.insert(task.id.clone(), task.dependencies.len());
        }

        Self {
            adjacency,
            in_degree,
            order: tasks.iter().map(|t| t.id.clone()).collect(),
            dependency_counts,
        }
    }

    /// Kahn 拓扑排序；存在环时返回 CyclicDependency
    pub fn topological_order(&self) -> Result<Vec<TaskId>, WorkflowError> {
        let mut in_degree = self.in_degree.clone();
        let position: HashMap<&TaskId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut queue: VecDeque<TaskId> = self
            .order
            .iter()
            .filter(|id| in_degree.get(*id) == Some(&0))
            .cloned()
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(task_id) = queue.pop_front() {
            let mut ready = Vec::new();
            if let Some(dependents) = self.adjacency.get(&task_id) {
                for dependent_id in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push(dependent_id.clone());
                        }
                    }
                }
            }
            ready.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            queue.extend(ready);
            sorted.push(task_id);
        }

        if sorted.len() != self.order.len() {
            return Err(WorkflowError::CyclicDependency);
        }
        Ok(sorted)
    }

    /// 第一个破坏线性链的任务：多于一个依赖、多于一个后继，或第二个根任务
    pub fn first_branching_task(&self) -> Option<TaskId> {
        let mut roots = 0;
        self.order
            .iter()
            .find(|id| {
                let deps = self.dependency_counts.get(*id).copied().unwrap_or(0);
                if deps == 0 {
                    roots += 1;
                }
                deps > 1 || roots > 1 || self.adjacency.get(*id).map(|d| d.len()).unwrap_or(0) > 1
            })
            .cloned()
    }
}
