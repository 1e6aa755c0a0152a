//! 工作流定义加载器
//!
//! 从目录加载 *.toml / *.json 工作流定义；每个文件一个工作流。
//! 无法解析或校验失败的文件跳过并记录 warn。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::workflow::compiler::WorkflowCompiler;
use crate::workflow::types::{Workflow, WorkflowError};

/// 单个定义文件的加载错误
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported file extension")]
    UnsupportedFormat,
    #[error(transparent)]
    Invalid(#[from] WorkflowError),
}

/// 工作流加载器
pub struct WorkflowLoader {
    dir: PathBuf,
}

impl WorkflowLoader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 加载目录下所有工作流（按文件名排序）；目录不存在时返回空
    pub fn load_all(&self) -> Result<Vec<Workflow>, LoadError> {
        let mut workflows = Vec::new();
        if !self.dir.exists() {
            return Ok(workflows);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_definition_file(path))
            .collect();
        paths.sort();

        for path in paths {
            match Self::load_file(&path) {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping workflow definition"),
            }
        }

        info!(dir = %self.dir.display(), count = workflows.len(), "Workflow definitions loaded");
        Ok(workflows)
    }

    /// 加载并校验单个定义文件
    pub fn load_file(path: &Path) -> Result<Workflow, LoadError> {
        let text = std::fs::read_to_string(path)?;
        let workflow: Workflow = match extension(path).as_deref() {
            Some("toml") => toml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => return Err(LoadError::UnsupportedFormat),
        };
        WorkflowCompiler::validate_workflow(&workflow)?;
        Ok(workflow)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_definition_file(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("toml") | Some("json"))
}
