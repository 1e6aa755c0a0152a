//! Nectar - 命令行对话入口
//!
//! 入口：初始化日志、加载配置装配助手，然后在标准输入上运行一个简单的对话循环。
//! 命令：/clear 清空对话，/workflows 列出工作流，/workflow <名称> <内容> 运行工作流，/quit 退出。

use std::io::Write;

use anyhow::Context;
use nectar::{create_assistant, observability, stream::StreamChunk, workflow::ContextMap};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let assistant = create_assistant(config_path).context("Failed to create assistant")?;
    let session = assistant.new_session();

    let mut context = ContextMap::new();
    context.insert("currentPage".into(), "chat".into());
    if let Some(name) = &assistant.config().app.name {
        context.insert("workspaceName".into(), name.clone().into());
    }

    println!("Nectar ready. Type a message, or /workflows, /workflow <name> <text>, /clear, /quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_messages();
                println!("(conversation cleared)");
                continue;
            }
            "/workflows" => {
                for name in assistant.plugins().workflow_names() {
                    println!("  {}", name);
                }
                continue;
            }
            _ => {}
        }

        let reply = if let Some(rest) = line.strip_prefix("/workflow ") {
            let (name, text) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            let Some(workflow) = assistant.workflow(name) else {
                println!("Unknown workflow: {}", name);
                continue;
            };
            session
                .send_workflow(text, workflow, &context, print_chunk)
                .await
        } else {
            session.send_streaming(line, &context, print_chunk).await
        };

        if reply.is_error() {
            println!("\n[error] {}", reply.content);
        } else {
            println!();
        }
    }

    Ok(())
}

fn print_chunk(chunk: &StreamChunk) {
    if let StreamChunk::Content { content, .. } = chunk {
        print!("{}", content);
        let _ = std::io::stdout().flush();
    }
}
