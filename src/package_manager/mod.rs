//! 包管理器模块：对 rpm / dnf 的封装

pub mod parser;
pub mod streaming;
pub mod types;

// 重新导出常用类型和函数
pub use streaming::{CommandRunner, Elevation, OperationRunner};
pub use types::{
    FileSubject, InstalledSubject, OperationKind, OperationRequest, OperationResult,
    PackageSubject, ProgressEvent, RunnerEvent,
};

use crate::config::Config;
use crate::error::QueryError;
use parser::{parse_file_record, parse_installed_info, parse_name_list, FIELD_DELIMITER};
use std::path::Path;
use std::process::{Command, Output};

/// 包数据库的只读查询与操作命令构造
///
/// 所有查询都是同步的短命令，在协调端直接调用。
pub trait PackageBackend {
    /// 全部已安装包名，按后端给出的顺序
    fn list_installed_names(&self) -> Result<Vec<String>, QueryError>;

    /// 已安装包详情；包不存在时返回 `QueryError::NotFound`
    fn describe_installed(&self, name: &str) -> Result<InstalledSubject, QueryError>;

    /// 包文件详情，并检查同名包是否已安装
    fn describe_file(&self, path: &Path) -> Result<FileSubject, QueryError>;

    /// 构造执行请求所需的命令（不含提权前缀）
    fn operation_command(&self, request: &OperationRequest) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct RpmBackend {
    /// 查询工具，默认 rpm
    pub query_tool: String,
    /// 安装/卸载工具，默认 dnf
    pub installer: String,
}

impl Default for RpmBackend {
    fn default() -> Self {
        Self {
            query_tool: "rpm".to_string(),
            installer: "dnf".to_string(),
        }
    }
}

impl RpmBackend {
    pub fn from_config(config: &Config) -> Self {
        Self {
            query_tool: config.query_tool.clone(),
            installer: config.installer.clone(),
        }
    }

    fn query(&self, args: &[&str]) -> Result<Output, QueryError> {
        log::debug!("查询: {} {}", self.query_tool, args.join(" "));
        Command::new(&self.query_tool)
            .args(args)
            .output()
            .map_err(|source| QueryError::Launch {
                program: self.query_tool.clone(),
                source,
            })
    }

    /// 非零退出时保留后端的错误输出
    fn backend_error(output: &Output) -> QueryError {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            QueryError::Backend(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            QueryError::Backend(stderr)
        }
    }

    /// 检查同名包是否已安装 (rpm -q)
    pub fn is_installed(&self, name: &str) -> Result<bool, QueryError> {
        Ok(self.query(&["-q", name])?.status.success())
    }
}

/// rpm 对未安装包的提示："package foo is not installed"
fn reports_not_installed(output: &Output) -> bool {
    String::from_utf8_lossy(&output.stdout).contains("is not installed")
        || String::from_utf8_lossy(&output.stderr).contains("is not installed")
}

impl PackageBackend for RpmBackend {
    fn list_installed_names(&self) -> Result<Vec<String>, QueryError> {
        let output = self.query(&["-qa", "--queryformat", "%{NAME}\n"])?;
        if !output.status.success() {
            return Err(Self::backend_error(&output));
        }
        Ok(parse_name_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn describe_installed(&self, name: &str) -> Result<InstalledSubject, QueryError> {
        let output = self.query(&["-qi", name])?;
        if !output.status.success() {
            if reports_not_installed(&output) {
                return Err(QueryError::NotFound(name.to_string()));
            }
            return Err(Self::backend_error(&output));
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(parse_installed_info(name, &raw))
    }

    fn describe_file(&self, path: &Path) -> Result<FileSubject, QueryError> {
        let format = [
            "%{NAME}",
            "%{VERSION}",
            "%{RELEASE}",
            "%{SUMMARY}",
            "%{DESCRIPTION}",
            "%{ARCH}",
        ]
        .join(FIELD_DELIMITER);
        let path_arg = path.to_string_lossy();
        let output = self.query(&["-qp", "--queryformat", &format, &path_arg])?;
        if !output.status.success() {
            return Err(Self::backend_error(&output));
        }

        let mut subject = parse_file_record(path, &String::from_utf8_lossy(&output.stdout))?;
        subject.installed_elsewhere = self.is_installed(&subject.resolved_name)?;
        log::debug!(
            "{} -> {}-{}-{} (已安装: {})",
            path.display(),
            subject.resolved_name,
            subject.version,
            subject.release,
            subject.installed_elsewhere
        );
        Ok(subject)
    }

    fn operation_command(&self, request: &OperationRequest) -> Vec<String> {
        let verb = match request.kind {
            OperationKind::Install => "install",
            OperationKind::Reinstall => "reinstall",
            OperationKind::Remove => "remove",
        };
        vec![
            self.installer.clone(),
            verb.to_string(),
            "-y".to_string(),
            request.target.clone(),
        ]
    }
}
