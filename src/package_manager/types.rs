//! PackageManager 相关数据类型定义

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// 从包文件 (rpm -qp) 读取到的元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSubject {
    pub path: PathBuf,
    pub resolved_name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub summary: String,
    pub description: String,
    /// 同名包是否已经安装在系统上
    pub installed_elsewhere: bool,
}

/// 已安装包信息 (rpm -qi)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledSubject {
    pub name: String,
    pub version: String,
    pub summary: String,
    /// 原始输出，原样用于详情显示
    pub raw_info: String,
}

/// 当前被管理的对象，同一时刻只有一个
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackageSubject {
    File(FileSubject),
    Installed(InstalledSubject),
    #[default]
    Empty,
}

impl PackageSubject {
    /// 该对象对应的包名（文件则为解析出的包名）
    pub fn package_name(&self) -> Option<&str> {
        match self {
            PackageSubject::File(f) => Some(&f.resolved_name),
            PackageSubject::Installed(i) => Some(&i.name),
            PackageSubject::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PackageSubject::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Install,
    Reinstall,
    Remove,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Install => "Install",
            OperationKind::Reinstall => "Reinstall",
            OperationKind::Remove => "Remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 一次特权操作请求，只能由当前对象构造
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRequest {
    pub kind: OperationKind,
    /// 文件路径（安装）或包名（卸载）
    pub target: String,
    pub requires_confirmation: bool,
}

/// 操作失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationFailure {
    /// 进程无法启动，或提权被拒绝
    Launch,
    NonZeroExit,
    /// 进程被信号终止，没有退出码
    Signal,
    /// 读取输出时出错
    Io,
}

/// 一次特权操作的最终结果，产生后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub succeeded: bool,
    pub exit_code: Option<i32>,
    pub message: String,
    /// 按到达顺序记录的输出行
    pub transcript: Vec<String>,
    pub failure: Option<OperationFailure>,
}

impl OperationResult {
    pub fn success(transcript: Vec<String>) -> Self {
        Self {
            succeeded: true,
            exit_code: Some(0),
            message: String::new(),
            transcript,
            failure: None,
        }
    }

    pub fn failed(
        failure: OperationFailure,
        exit_code: Option<i32>,
        message: impl Into<String>,
        transcript: Vec<String>,
    ) -> Self {
        Self {
            succeeded: false,
            exit_code,
            message: message.into(),
            transcript,
            failure: Some(failure),
        }
    }

    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::failed(OperationFailure::Launch, None, message, Vec::new())
    }

    /// 完整输出，每行以换行结尾
    pub fn combined_output(&self) -> String {
        let mut out = String::new();
        for line in &self.transcript {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// 运行中的进程输出的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub line: String,
}

/// 后台执行器发回协调端的事件：若干 Progress，最后恰好一个 Finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Progress(ProgressEvent),
    Finished(OperationResult),
}
