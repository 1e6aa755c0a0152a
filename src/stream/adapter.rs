//! 流式适配器：ExecutorEvent -> StreamChunk
//!
//! Progress / Complete 都作为增量内容追加；Error 单独成块且不改变已累计内容。
//! 终止事件之后到达的事件一律丢弃。

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::stream::events::{ExecutorEvent, StreamChunk};

/// 有状态的事件归一化器（一次运行一个实例）
#[derive(Debug, Default)]
pub struct StreamAdapter {
    accumulated: String,
    terminated: bool,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 归一化一个事件；终止之后返回 None
    pub fn normalize(&mut self, event: ExecutorEvent) -> Option<StreamChunk> {
        if self.terminated {
            return None;
        }
        if event.is_terminal() {
            self.terminated = true;
        }

        match event {
            ExecutorEvent::Progress { message, .. } => Some(self.append(message)),
            ExecutorEvent::Complete { result } => Some(self.append(result)),
            ExecutorEvent::Error { error } => Some(StreamChunk::Error { error }),
        }
    }

    /// 到目前为止累计的内容
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn append(&mut self, delta: String) -> StreamChunk {
        self.accumulated.push_str(&delta);
        StreamChunk::Content {
            content: delta,
            accumulated_content: self.accumulated.clone(),
        }
    }
}

/// 基于 channel 的块流：从执行器事件通道读取并归一化
pub struct ChunkStream {
    rx: mpsc::UnboundedReceiver<ExecutorEvent>,
    adapter: StreamAdapter,
}

impl ChunkStream {
    pub fn new(rx: mpsc::UnboundedReceiver<ExecutorEvent>) -> Self {
        Self {
            rx,
            adapter: StreamAdapter::new(),
        }
    }

    /// 下一个块；发送端全部关闭后返回 None
    pub async fn next(&mut self) -> Option<StreamChunk> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(chunk) = self.adapter.normalize(event) {
                return Some(chunk);
            }
        }
    }

    pub fn accumulated(&self) -> &str {
        self.adapter.accumulated()
    }

    /// 转为 futures Stream
    pub fn into_stream(self) -> impl Stream<Item = StreamChunk> {
        futures_util::stream::unfold(self, |mut chunks| async move {
            let chunk = chunks.next().await?;
            Some((chunk, chunks))
        })
    }
}
