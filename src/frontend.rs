//! 命令行前端：把用户输入转成会话调用，并把会话事件打印出来

use crate::cli::InitialAction;
use crate::error::SessionError;
use crate::package_manager::parser::clean_terminal_output;
use crate::package_manager::{OperationRequest, OperationRunner, PackageBackend, PackageSubject};
use crate::report::TranscriptSaver;
use crate::resolver::MatchSet;
use crate::session::{SearchOutcome, Session, SessionEvent, SessionState};
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

const HELP: &str = "命令:\n  \
open <文件>     载入包文件\n  \
search <关键字> 搜索已安装包\n  \
install        安装 / 重新安装当前文件\n  \
remove         卸载当前包\n  \
show           显示当前对象\n  \
help           显示帮助\n  \
quit           退出";

/// 用户输入的一条命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(PathBuf),
    Search(String),
    Install,
    Remove,
    Show,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "" => Command::Empty,
        "open" | "o" if !rest.is_empty() => Command::Open(PathBuf::from(rest)),
        "search" | "s" if !rest.is_empty() => Command::Search(rest.to_string()),
        "install" | "i" => Command::Install,
        "remove" | "r" => Command::Remove,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// 当前对象的详细显示
pub fn render_subject(state: SessionState, subject: &PackageSubject) -> Vec<String> {
    match subject {
        PackageSubject::File(file) => {
            let mut lines = vec![
                format!(
                    "{}-{}-{}.{}",
                    file.resolved_name, file.version, file.release, file.arch
                ),
                format!("文件: {}", file.path.display()),
                format!("摘要: {}", file.summary),
                format!(
                    "状态: {}",
                    if file.installed_elsewhere { "已安装" } else { "未安装" }
                ),
            ];
            if !file.description.is_empty() {
                lines.push(String::new());
                lines.extend(file.description.lines().map(str::to_string));
            }
            lines
        }
        PackageSubject::Installed(installed) => {
            installed.raw_info.lines().map(str::to_string).collect()
        }
        PackageSubject::Empty if state == SessionState::Removed => vec!["已卸载".to_string()],
        PackageSubject::Empty => vec!["未选择任何包".to_string()],
    }
}

/// 把一个事件渲染为若干行文本
pub fn render_event(event: &SessionEvent) -> Vec<String> {
    match event {
        SessionEvent::SubjectChanged { state, subject } => render_subject(*state, subject),
        SessionEvent::NoResults { term } => vec![format!("没有找到匹配 \"{}\" 的已安装包", term)],
        SessionEvent::Candidates(set) => {
            let mut lines = vec![format!("\"{}\" 匹配到 {} 个包:", set.term, set.candidates.len())];
            lines.extend(
                set.candidates
                    .iter()
                    .enumerate()
                    .map(|(i, name)| format!("  {:>3}. {}", i + 1, name)),
            );
            lines
        }
        SessionEvent::Progress(progress) => vec![clean_terminal_output(&progress.line)],
        SessionEvent::Finished { request, result } => {
            if result.succeeded {
                vec![format!("✔ {} {} 完成", request.kind, request.target)]
            } else {
                vec![format!(
                    "✘ {} {} 失败: {}",
                    request.kind, request.target, result.message
                )]
            }
        }
        SessionEvent::Error { message } => vec![format!("错误: {}", message)],
    }
}

/// 按用户输入的编号（从 1 开始）取候选，非法输入视为取消
pub fn candidate_at<'a>(set: &'a MatchSet, answer: &str) -> Option<&'a str> {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| set.candidates.get(i))
        .map(String::as_str)
}

pub struct Frontend<B, R> {
    session: Session<B, R>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    input: Lines<BufReader<Stdin>>,
    json: bool,
    saver: Option<TranscriptSaver>,
}

impl<B: PackageBackend, R: OperationRunner> Frontend<B, R> {
    pub fn new(
        session: Session<B, R>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        json: bool,
        saver: Option<TranscriptSaver>,
    ) -> Self {
        Self {
            session,
            events,
            input: BufReader::new(tokio::io::stdin()).lines(),
            json,
            saver,
        }
    }

    fn print_event(&self, event: &SessionEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::error!("序列化事件失败: {}", e),
            }
        } else {
            for line in render_event(event) {
                println!("{}", line);
            }
        }
    }

    /// 打印目前积压的事件
    fn flush_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.print_event(&event);
        }
    }

    async fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        if !self.json {
            print!("{}", text);
            std::io::stdout().flush()?;
        }
        Ok(self.input.next_line().await?)
    }

    /// 会话错误已通过事件上报的情况下只记日志，否则直接打印
    fn report(&self, err: &SessionError) {
        match err {
            SessionError::Query(e) => log::debug!("{}", e),
            other => self.print_event(&SessionEvent::Error {
                message: other.to_string(),
            }),
        }
    }

    pub async fn run(mut self, initial: Option<InitialAction>) -> Result<()> {
        match initial {
            Some(InitialAction::Search(term)) => self.search(&term).await?,
            Some(InitialAction::LoadFile(path)) => self.execute(Command::Open(path)).await?,
            None => {
                if !self.json {
                    println!("{}", HELP);
                }
            }
        }
        self.flush_events();

        loop {
            let Some(line) = self.prompt("> ").await? else {
                break;
            };
            let command = parse_command(&line);
            if command == Command::Quit {
                break;
            }
            self.execute(command).await?;
            self.flush_events();
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Open(path) => {
                if let Err(e) = self.session.load_file(&path) {
                    self.report(&e);
                } else if let Some(label) = self.session.action_label() {
                    self.flush_events();
                    if !self.json {
                        println!("可执行: {} (输入 install)", label);
                    }
                }
            }
            Command::Search(term) => self.search(&term).await?,
            Command::Install => match self.session.install() {
                Ok(request) => self.follow_operation(request).await?,
                Err(e) => self.report(&e),
            },
            Command::Remove => self.remove().await?,
            Command::Show => {
                let lines = render_subject(self.session.state(), self.session.subject());
                for line in lines {
                    println!("{}", line);
                }
                if let Some(result) = self.session.last_result().filter(|r| !r.succeeded) {
                    println!("上次操作失败: {}", result.message);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit | Command::Empty => {}
            Command::Unknown(text) => println!("未知命令: {} (输入 help 查看帮助)", text),
        }
        Ok(())
    }

    async fn search(&mut self, term: &str) -> Result<()> {
        match self.session.search(term) {
            Ok(SearchOutcome::Ambiguous(_)) => {}
            Ok(_) => return Ok(()),
            Err(e) => {
                self.report(&e);
                return Ok(());
            }
        }
        self.flush_events();

        let answer = self.prompt("选择编号 (回车取消): ").await?.unwrap_or_default();
        let choice = self
            .session
            .pending_candidates()
            .and_then(|set| candidate_at(set, &answer))
            .map(str::to_string);
        match choice {
            Some(name) => {
                if let Err(e) = self.session.select_candidate(&name) {
                    self.report(&e);
                }
            }
            None => {
                log::debug!("取消选择");
                self.session.cancel_selection();
            }
        }
        Ok(())
    }

    async fn remove(&mut self) -> Result<()> {
        let subject = self.session.subject();
        if subject.is_empty() {
            self.report(&SessionError::InvalidOperation("remove"));
            return Ok(());
        }
        let name = subject.package_name().unwrap_or_default().to_string();
        if self.session.is_busy() {
            self.report(&SessionError::Busy);
            return Ok(());
        }
        let answer = self
            .prompt(&format!("确认卸载 {}? [y/N] ", name))
            .await?
            .unwrap_or_default();
        let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");

        match self.session.remove(|request| {
            log::debug!("卸载确认 {}: {}", request.target, confirmed);
            confirmed
        }) {
            Ok(Some(request)) => self.follow_operation(request).await?,
            Ok(None) => {}
            Err(e) => self.report(&e),
        }
        Ok(())
    }

    /// 边运行边打印进度，结束后保存输出
    async fn follow_operation(&mut self, request: OperationRequest) -> Result<()> {
        self.flush_events();
        let json = self.json;
        let events = &mut self.events;
        let printer = async {
            while let Some(event) = events.recv().await {
                let finished = matches!(event, SessionEvent::Finished { .. });
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => log::error!("序列化事件失败: {}", e),
                    }
                } else {
                    for line in render_event(&event) {
                        println!("{}", line);
                    }
                }
                if finished {
                    break;
                }
            }
        };
        let (result, ()) = tokio::join!(self.session.wait_for_result(), printer);

        if let (Some(result), Some(saver)) = (result, &self.saver) {
            match saver.save(&request, &result) {
                Ok(path) => log::info!("输出已保存到 {}", path.display()),
                Err(e) => log::error!("保存输出失败: {}", e),
            }
        }
        Ok(())
    }
}
