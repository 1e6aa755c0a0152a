//! 流式适配层：执行器事件归一化为统一的块协议

pub mod adapter;
pub mod events;

pub use adapter::{ChunkStream, StreamAdapter};
pub use events::{ExecutorEvent, StreamChunk};
