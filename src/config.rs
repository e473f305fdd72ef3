use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 提权命令前缀，已是 root 时忽略
    pub elevation: Vec<String>,
    pub query_tool: String,
    pub installer: String,
    /// 视为包文件的后缀
    pub package_suffixes: Vec<String>,
    pub save_transcripts: bool,
    pub transcript_dir: PathBuf,
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elevation: vec!["pkexec".to_string()],
            query_tool: "rpm".to_string(),
            installer: "dnf".to_string(),
            package_suffixes: vec![".rpm".to_string()],
            save_transcripts: true,
            transcript_dir: home_dir().join(".local/share/rpmpilot/transcripts"),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        home_dir().join(".config/rpmpilot/config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// 文件不存在时使用默认配置
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("读取配置文件 {} 失败", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("解析配置文件 {} 失败", config_path.display()))?;
            log::debug!("已加载配置 {}", config_path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// 参数是否像一个包文件
    pub fn is_package_file(&self, arg: &str) -> bool {
        let lower = arg.to_lowercase();
        self.package_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
    }
}
