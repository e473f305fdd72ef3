use crate::package_manager::{OperationRequest, OperationResult};
use anyhow::Result;
use chrono::Local;
use std::fs;
use std::path::PathBuf;

/// 保存每次操作的完整输出
pub struct TranscriptSaver {
    base_dir: PathBuf,
}

impl TranscriptSaver {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn save(&self, request: &OperationRequest, result: &OperationResult) -> Result<PathBuf> {
        let now = Local::now();

        // 目录结构: YYYY/MM/DD/
        let dir = self
            .base_dir
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string())
            .join(now.format("%d").to_string());
        fs::create_dir_all(&dir)?;

        // 文件名: HH-MM-SS-<操作>.log
        let filename = format!(
            "{}-{}.log",
            now.format("%H-%M-%S"),
            request.kind.label().to_lowercase()
        );
        let filepath = dir.join(filename);

        let status = if result.succeeded {
            "成功".to_string()
        } else {
            format!("失败 ({})", result.message)
        };
        let mut content = format!(
            "{} {}\n时间: {}\n结果: {}\n\n",
            request.kind,
            request.target,
            now.format("%Y-%m-%d %H:%M:%S"),
            status
        );
        content.push_str(&result.combined_output());

        fs::write(&filepath, content)?;
        Ok(filepath)
    }
}
