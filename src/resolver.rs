//! 已安装包名的模糊匹配

use serde::Serialize;

/// 一次搜索的匹配结果，候选按不区分大小写的字典序升序排列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSet {
    pub term: String,
    pub candidates: Vec<String>,
}

/// 匹配结果归约后的三种情况
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NoResults,
    Resolved(String),
    /// 需要外部选择其中一个，或取消
    Ambiguous(MatchSet),
}

/// 不区分大小写的子串匹配，结果排序后返回
///
/// 空关键字应由调用方拒绝，这里不做特殊处理。
pub fn search<S: AsRef<str>>(term: &str, names: &[S]) -> MatchSet {
    let needle = term.to_lowercase();
    let mut candidates: Vec<String> = names
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| name.to_lowercase().contains(&needle))
        .map(str::to_string)
        .collect();
    candidates.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    MatchSet {
        term: term.to_string(),
        candidates,
    }
}

impl MatchSet {
    pub fn reduce(self) -> Resolution {
        match self.candidates.len() {
            0 => Resolution::NoResults,
            1 => Resolution::Resolved(self.candidates.into_iter().next().unwrap_or_default()),
            _ => Resolution::Ambiguous(self),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.candidates.iter().any(|c| c == name)
    }
}
