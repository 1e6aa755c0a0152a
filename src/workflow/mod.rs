pub mod builder;
pub mod compiler;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod types;

pub use builder::WorkflowBuilder;
pub use compiler::{merge_context, WorkflowCompiler};
pub use engine::{AgentInvoker, RunOutput, TaskGraphExecutor, TaskRecord};
pub use graph::WorkflowGraph;
pub use loader::{LoadError, WorkflowLoader};
pub use types::*;
