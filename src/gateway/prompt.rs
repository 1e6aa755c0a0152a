//! 网关系统提示词
//!
//! 由上下文中的 currentPage / userRole / workspaceName 生成"当前环境"段落，
//! 再附加当前页面的专属指引（内置 + 插件提供）。

use std::collections::HashMap;

use serde_json::Value;

use crate::workflow::ContextMap;

pub const CTX_CURRENT_PAGE: &str = "currentPage";
pub const CTX_USER_ROLE: &str = "userRole";
pub const CTX_WORKSPACE_NAME: &str = "workspaceName";
pub const CTX_REQUIRES_REASONING: &str = "requiresReasoning";

const BASE_PROMPT: &str = "You are the AI assistant built into a collaborative workspace platform. \
Help users manage workspaces, members, modules and plugins. \
Be accurate and concise; use Markdown with fenced code blocks for code.";

/// 内置的页面指引
const BUILTIN_GUIDANCE: &[(&str, &str)] = &[
    (
        "dashboard",
        "The user is on the dashboard. Summarize activity and suggest next steps when asked.",
    ),
    (
        "workspaces",
        "The user is managing workspaces. Explain how to create, rename and archive workspaces.",
    ),
    (
        "members",
        "The user is managing members. Explain invitations and roles; never claim to change permissions yourself.",
    ),
    (
        "modules",
        "The user is working with modules. Help design module fields and generate configuration snippets.",
    ),
    (
        "plugins",
        "The user is browsing plugins. Describe what a plugin does and how to enable it.",
    ),
    (
        "settings",
        "The user is in settings. Point to the relevant setting rather than guessing values.",
    ),
];

/// 系统提示词构建器
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    base: String,
    /// 页面名（小写）-> 指引
    guidance: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
            guidance: BUILTIN_GUIDANCE
                .iter()
                .map(|(page, text)| (page.to_string(), text.to_string()))
                .collect(),
        }
    }

    /// 添加或覆盖某个页面的指引
    pub fn with_page_guidance(mut self, page: impl AsRef<str>, guidance: impl Into<String>) -> Self {
        self.guidance
            .insert(page.as_ref().trim().to_lowercase(), guidance.into());
        self
    }

    pub fn page_guidance(&self, page: &str) -> Option<&str> {
        self.guidance
            .get(&page.trim().to_lowercase())
            .map(String::as_str)
    }

    /// 完整的网关系统提示词
    pub fn system_prompt(&self, context: &ContextMap) -> String {
        let mut prompt = self.base.clone();
        if let Some(section) = self.context_section(context) {
            prompt.push_str("\n\n");
            prompt.push_str(&section);
        }
        prompt
    }

    /// 上下文段落（环境信息 + 页面指引）；上下文里没有相关键时返回 None
    pub fn context_section(&self, context: &ContextMap) -> Option<String> {
        let page = context_str(context, CTX_CURRENT_PAGE);
        let role = context_str(context, CTX_USER_ROLE);
        let workspace = context_str(context, CTX_WORKSPACE_NAME);
        if page.is_none() && role.is_none() && workspace.is_none() {
            return None;
        }

        let mut section = String::from("Current context:");
        if let Some(page) = page {
            section.push_str(&format!("\n- Page: {}", page));
        }
        if let Some(role) = role {
            section.push_str(&format!("\n- User role: {}", role));
        }
        if let Some(workspace) = workspace {
            section.push_str(&format!("\n- Workspace: {}", workspace));
        }
        if let Some(guidance) = page.and_then(|p| self.page_guidance(p)) {
            section.push_str("\n\n");
            section.push_str(guidance);
        }
        Some(section)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// requiresReasoning 是否为真：true、"true"、非零数字
pub fn requires_reasoning(context: &ContextMap) -> bool {
    match context.get(CTX_REQUIRES_REASONING) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn context_str<'a>(context: &'a ContextMap, key: &str) -> Option<&'a str> {
    context
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> ContextMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_prompt_includes_context_and_guidance() {
        let builder = PromptBuilder::new();
        let prompt = builder.system_prompt(&ctx(json!({
            "currentPage": "Members",
            "userRole": "admin",
            "workspaceName": "Acme"
        })));
        assert!(prompt.starts_with(BASE_PROMPT));
        assert!(prompt.contains("- Page: Members"));
        assert!(prompt.contains("- User role: admin"));
        assert!(prompt.contains("- Workspace: Acme"));
        assert!(prompt.contains("managing members"));
    }

    #[test]
    fn test_empty_context_is_base_only() {
        let builder = PromptBuilder::new();
        assert_eq!(builder.system_prompt(&ContextMap::new()), BASE_PROMPT);
        assert!(builder.context_section(&ctx(json!({"other": 1}))).is_none());
    }

    #[test]
    fn test_plugin_guidance_overrides() {
        let builder = PromptBuilder::new().with_page_guidance("Research", "Cite sources.");
        let section = builder
            .context_section(&ctx(json!({"currentPage": "research"})))
            .unwrap();
        assert!(section.ends_with("Cite sources."));
    }

    #[test]
    fn test_requires_reasoning_truthiness() {
        assert!(requires_reasoning(&ctx(json!({"requiresReasoning": true}))));
        assert!(requires_reasoning(&ctx(json!({"requiresReasoning": "TRUE"}))));
        assert!(requires_reasoning(&ctx(json!({"requiresReasoning": 1}))));
        assert!(!requires_reasoning(&ctx(json!({"requiresReasoning": false}))));
        assert!(!requires_reasoning(&ContextMap::new()));
    }
}
