use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// rpmpilot - 安装、重新安装或卸载 RPM 包
#[derive(Debug, Parser)]
#[command(name = "rpmpilot", version, about, long_about = None)]
pub struct Cli {
    /// 搜索要卸载的已安装包
    #[arg(short = 'r', long = "remove", value_name = "NAME", conflicts_with = "target")]
    pub remove: Option<String>,

    /// 要安装的包文件
    #[arg(value_name = "FILE")]
    pub target: Option<String>,

    /// 以 JSON 行输出事件
    #[arg(long)]
    pub json: bool,

    /// 配置文件路径
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// 启动时预先执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialAction {
    Search(String),
    LoadFile(PathBuf),
}

impl Cli {
    pub fn initial_action(&self, config: &Config) -> Option<InitialAction> {
        if let Some(name) = &self.remove {
            return Some(InitialAction::Search(name.clone()));
        }
        match &self.target {
            Some(arg) if config.is_package_file(arg) => Some(InitialAction::LoadFile(PathBuf::from(arg))),
            Some(arg) => {
                log::warn!("忽略无法识别的参数: {}", arg);
                None
            }
            None => None,
        }
    }
}
