//! 对话消息

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 消息内容类型：决定 UI 的渲染方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Markdown,
    Error,
}

impl ContentType {
    /// 含围栏代码块时视为 Markdown
    pub fn classify(content: &str) -> Self {
        if content.contains("```") {
            ContentType::Markdown
        } else {
            ContentType::Text
        }
    }
}

/// 对话中的一条消息；id 在会话内唯一，定稿前后保持不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            content_type,
            is_streaming: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, ContentType::Text)
    }

    /// 定稿的助手消息，内容类型按内容判定
    pub fn assistant(content: impl Into<String>) -> Self {
        let content = content.into();
        let content_type = ContentType::classify(&content);
        Self::new(Role::Assistant, content, content_type)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, ContentType::Error)
    }

    /// 流式占位消息：空内容，is_streaming = true
    pub fn placeholder() -> Self {
        let mut message = Self::new(Role::Assistant, String::new(), ContentType::Text);
        message.is_streaming = true;
        message
    }

    pub fn is_error(&self) -> bool {
        self.content_type == ContentType::Error
    }
}
