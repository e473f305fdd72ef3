//! 流式命令执行（install / reinstall / remove）

use super::types::{OperationFailure, OperationResult, ProgressEvent, RunnerEvent};
use std::io::{BufRead, BufReader};
use tokio::sync::mpsc;

/// pkexec 自身的退出码：126 = 授权被拒绝或对话框被取消，127 = 认证失败
///
/// 这两种情况归为 `OperationFailure::Launch`，但 pkexec 的输出已经作为进度发出，
/// 结果的 transcript 可能非空。
const ELEVATION_DENIED_CODES: [i32; 2] = [126, 127];

/// 提权前缀，例如 `["pkexec"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    prefix: Vec<String>,
}

impl Elevation {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    /// 不做任何包装
    pub fn none() -> Self {
        Self { prefix: Vec::new() }
    }

    /// 已经是 root 时无需提权
    pub fn for_current_user(prefix: Vec<String>) -> Self {
        if unsafe { libc::geteuid() } == 0 {
            log::debug!("当前已是 root，跳过提权前缀");
            Self::none()
        } else {
            Self::new(prefix)
        }
    }

    pub fn is_active(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// 给命令加上提权前缀
    pub fn wrap(&self, argv: &[String]) -> Vec<String> {
        self.prefix.iter().chain(argv).cloned().collect()
    }
}

/// 执行一条特权命令的后端
///
/// 调用方只负责消费事件；同一会话内同时只能有一个执行中的命令，由会话保证。
pub trait OperationRunner {
    fn start(&self, argv: Vec<String>) -> mpsc::UnboundedReceiver<RunnerEvent>;
}

/// 真实的命令执行器：在独立线程中运行进程并逐行回传输出
#[derive(Debug, Clone)]
pub struct CommandRunner {
    elevation: Elevation,
}

impl CommandRunner {
    pub fn new(elevation: Elevation) -> Self {
        Self { elevation }
    }
}

impl OperationRunner for CommandRunner {
    fn start(&self, argv: Vec<String>) -> mpsc::UnboundedReceiver<RunnerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let elevation = self.elevation.clone();
        std::thread::spawn(move || {
            let result = run_streaming_command(&elevation, &argv, &tx);
            let _ = tx.send(RunnerEvent::Finished(result));
        });
        rx
    }
}

/// 去掉行尾的换行符并做宽松解码
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    while end > 0 && (raw[end - 1] == b'\n' || raw[end - 1] == b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// 运行命令直到输出关闭且进程退出
///
/// stderr 合并进 stdout，每读完一行立即发送一个 Progress 事件。
/// 结果不经 channel 发送，由调用方在所有 Progress 之后发送。
pub fn run_streaming_command(
    elevation: &Elevation,
    argv: &[String],
    tx: &mpsc::UnboundedSender<RunnerEvent>,
) -> OperationResult {
    let full = elevation.wrap(argv);
    let Some((program, args)) = full.split_first() else {
        return OperationResult::launch_failure("命令不能为空");
    };

    log::info!("执行: {}", full.join(" "));

    let reader = match duct::cmd(program.as_str(), args)
        .stderr_to_stdout()
        .stdin_null()
        .unchecked()
        .reader()
    {
        Ok(reader) => reader,
        Err(e) => {
            log::warn!("无法启动 {}: {}", program, e);
            return OperationResult::launch_failure(format!("无法启动 {}: {}", program, e));
        }
    };

    let mut transcript = Vec::new();
    let mut buffered = BufReader::new(&reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match buffered.read_until(b'\n', &mut raw) {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&raw);
                let _ = tx.send(RunnerEvent::Progress(ProgressEvent { line: line.clone() }));
                transcript.push(line);
            }
            Err(e) => {
                log::warn!("读取 {} 输出失败: {}", program, e);
                let _ = reader.kill();
                return OperationResult::failed(
                    OperationFailure::Io,
                    None,
                    format!("读取输出失败: {}", e),
                    transcript,
                );
            }
        }
    }

    let status = loop {
        match reader.try_wait() {
            Ok(Some(output)) => break output.status,
            Ok(None) => std::thread::sleep(std::time::Duration::from_millis(50)),
            Err(e) => {
                return OperationResult::failed(
                    OperationFailure::Io,
                    None,
                    format!("等待进程退出失败: {}", e),
                    transcript,
                );
            }
        }
    };

    match status.code() {
        Some(0) => OperationResult::success(transcript),
        Some(code) if elevation.is_active() && ELEVATION_DENIED_CODES.contains(&code) => {
            log::warn!("提权被拒绝 (exit code {})", code);
            OperationResult::failed(
                OperationFailure::Launch,
                Some(code),
                format!("authorization denied or dismissed (exit code {})", code),
                transcript,
            )
        }
        Some(code) => OperationResult::failed(
            OperationFailure::NonZeroExit,
            Some(code),
            format!("exit code {}", code),
            transcript,
        ),
        None => OperationResult::failed(
            OperationFailure::Signal,
            None,
            "terminated by signal",
            transcript,
        ),
    }
}
