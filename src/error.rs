//! 错误类型定义

use thiserror::Error;

/// 包查询错误
#[derive(Debug, Error)]
pub enum QueryError {
    /// 查询的已安装包不存在，调用方应静默忽略
    #[error("package {0} is not installed")]
    NotFound(String),

    #[error("无法解析包信息: 需要 {expected} 个字段，实际得到 {found} 个")]
    Parse { expected: usize, found: usize },

    /// 后端非零退出，保留其原始错误输出
    #[error("{0}")]
    Backend(String),

    #[error("无法执行 {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// 会话状态机错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("已有操作正在进行")]
    Busy,

    #[error("搜索关键字不能为空")]
    EmptySearchTerm,

    #[error("{0} 不在候选列表中")]
    UnknownCandidate(String),

    #[error("当前没有可执行 {0} 的对象")]
    InvalidOperation(&'static str),
}
