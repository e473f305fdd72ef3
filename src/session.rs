//! 会话状态机：持有当前对象，决定可执行的操作以及操作完成后的状态

use crate::error::{QueryError, SessionError};
use crate::package_manager::{
    OperationKind, OperationRequest, OperationResult, OperationRunner, PackageBackend,
    PackageSubject, ProgressEvent, RunnerEvent,
};
use crate::package_manager::types::OperationFailure;
use crate::resolver::{self, MatchSet, Resolution};
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;

// ========== 枚举 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    FileLoaded,
    InstalledLoaded,
    Installing,
    Removing,
    Removed,
}

/// 搜索后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    NoResults,
    /// 唯一匹配，已直接选中
    Selected(String),
    /// 多个匹配，等待 select_candidate 或 cancel_selection
    Ambiguous(MatchSet),
}

// ========== 事件 ==========

/// 会话向界面发布的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SubjectChanged {
        state: SessionState,
        subject: PackageSubject,
    },
    NoResults {
        term: String,
    },
    Candidates(MatchSet),
    Progress(ProgressEvent),
    Finished {
        request: OperationRequest,
        result: OperationResult,
    },
    Error {
        message: String,
    },
}

struct ActiveOperation {
    request: OperationRequest,
    events: mpsc::UnboundedReceiver<RunnerEvent>,
}

pub struct Session<B, R> {
    backend: B,
    runner: R,
    state: SessionState,
    subject: PackageSubject,
    pending: Option<MatchSet>,
    active: Option<ActiveOperation>,
    last_result: Option<OperationResult>,
    notify: mpsc::UnboundedSender<SessionEvent>,
}

impl<B: PackageBackend, R: OperationRunner> Session<B, R> {
    pub fn new(backend: B, runner: R) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (notify, rx) = mpsc::unbounded_channel();
        let session = Self {
            backend,
            runner,
            state: SessionState::Idle,
            subject: PackageSubject::Empty,
            pending: None,
            active: None,
            last_result: None,
            notify,
        };
        (session, rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subject(&self) -> &PackageSubject {
        &self.subject
    }

    /// 操作进行中时，所有触发操作或更换对象的调用都会被拒绝
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn pending_candidates(&self) -> Option<&MatchSet> {
        self.pending.as_ref()
    }

    pub fn last_result(&self) -> Option<&OperationResult> {
        self.last_result.as_ref()
    }

    /// 文件对象的操作按钮文字
    pub fn action_label(&self) -> Option<&'static str> {
        match &self.subject {
            PackageSubject::File(f) if f.installed_elsewhere => Some(OperationKind::Reinstall.label()),
            PackageSubject::File(_) => Some(OperationKind::Install.label()),
            _ => None,
        }
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.notify.send(event);
    }

    fn publish_error(&self, err: &dyn std::fmt::Display) {
        self.publish(SessionEvent::Error {
            message: err.to_string(),
        });
    }

    fn set_subject(&mut self, state: SessionState, subject: PackageSubject) {
        self.state = state;
        self.subject = subject;
        self.publish(SessionEvent::SubjectChanged {
            state,
            subject: self.subject.clone(),
        });
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    // ===== 选择对象 =====

    /// 读取包文件；失败时回到 Idle 并上报错误
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.pending = None;
        let path = path.as_ref();
        match self.backend.describe_file(path) {
            Ok(file) => {
                log::info!("已载入 {}", path.display());
                self.set_subject(SessionState::FileLoaded, PackageSubject::File(file));
                Ok(())
            }
            Err(e) => {
                log::warn!("读取 {} 失败: {}", path.display(), e);
                self.publish_error(&e);
                self.set_subject(SessionState::Idle, PackageSubject::Empty);
                Err(e.into())
            }
        }
    }

    /// 选中已安装包；包不存在时静默忽略并返回 false
    pub fn select_installed(&mut self, name: &str) -> Result<bool, SessionError> {
        self.ensure_idle()?;
        match self.backend.describe_installed(name) {
            Ok(installed) => {
                self.pending = None;
                self.set_subject(SessionState::InstalledLoaded, PackageSubject::Installed(installed));
                Ok(true)
            }
            Err(QueryError::NotFound(_)) => {
                log::debug!("{} 未安装，忽略", name);
                Ok(false)
            }
            Err(e) => {
                self.publish_error(&e);
                Err(e.into())
            }
        }
    }

    /// 在已安装包中模糊搜索
    pub fn search(&mut self, term: &str) -> Result<SearchOutcome, SessionError> {
        self.ensure_idle()?;
        if term.trim().is_empty() {
            return Err(SessionError::EmptySearchTerm);
        }
        let names = self.backend.list_installed_names().inspect_err(|e| {
            self.publish_error(e);
        })?;
        self.pending = None;

        match resolver::search(term, &names).reduce() {
            Resolution::NoResults => {
                self.publish(SessionEvent::NoResults {
                    term: term.to_string(),
                });
                Ok(SearchOutcome::NoResults)
            }
            // 列表与详情查询之间包可能已被卸载，此时按无结果处理且不发事件
            Resolution::Resolved(name) => {
                if self.select_installed(&name)? {
                    Ok(SearchOutcome::Selected(name))
                } else {
                    Ok(SearchOutcome::NoResults)
                }
            }
            Resolution::Ambiguous(set) => {
                log::debug!("\"{}\" 有 {} 个候选", term, set.candidates.len());
                self.publish(SessionEvent::Candidates(set.clone()));
                self.pending = Some(set.clone());
                Ok(SearchOutcome::Ambiguous(set))
            }
        }
    }

    /// 从上一次搜索的候选中选一个
    pub fn select_candidate(&mut self, name: &str) -> Result<bool, SessionError> {
        self.ensure_idle()?;
        match &self.pending {
            Some(set) if set.contains(name) => {}
            _ => return Err(SessionError::UnknownCandidate(name.to_string())),
        }
        self.pending = None;
        self.select_installed(name)
    }

    /// 放弃选择，当前对象不变
    pub fn cancel_selection(&mut self) {
        self.pending = None;
    }

    // ===== 操作 =====

    /// 安装当前文件；同名包已安装时为重新安装
    pub fn install(&mut self) -> Result<OperationRequest, SessionError> {
        self.ensure_idle()?;
        let request = match (&self.state, &self.subject) {
            (SessionState::FileLoaded, PackageSubject::File(file)) => OperationRequest {
                kind: if file.installed_elsewhere {
                    OperationKind::Reinstall
                } else {
                    OperationKind::Install
                },
                target: file.path.to_string_lossy().into_owned(),
                requires_confirmation: false,
            },
            _ => return Err(SessionError::InvalidOperation("install")),
        };
        self.start(SessionState::Installing, request.clone());
        Ok(request)
    }

    /// 卸载当前对象对应的包
    ///
    /// `confirm` 总会被调用；返回 false 时不做任何事并返回 `Ok(None)`。
    pub fn remove(
        &mut self,
        confirm: impl FnOnce(&OperationRequest) -> bool,
    ) -> Result<Option<OperationRequest>, SessionError> {
        self.ensure_idle()?;
        let target = match (&self.state, &self.subject) {
            (SessionState::FileLoaded, PackageSubject::File(file)) => file.resolved_name.clone(),
            (SessionState::InstalledLoaded, PackageSubject::Installed(installed)) => {
                installed.name.clone()
            }
            _ => return Err(SessionError::InvalidOperation("remove")),
        };
        let request = OperationRequest {
            kind: OperationKind::Remove,
            target,
            requires_confirmation: true,
        };
        if !confirm(&request) {
            log::info!("用户取消卸载 {}", request.target);
            return Ok(None);
        }
        self.start(SessionState::Removing, request.clone());
        Ok(Some(request))
    }

    fn start(&mut self, state: SessionState, request: OperationRequest) {
        let argv = self.backend.operation_command(&request);
        log::info!("{} {}", request.kind, request.target);
        self.state = state;
        self.last_result = None;
        let events = self.runner.start(argv);
        self.active = Some(ActiveOperation { request, events });
    }

    /// 转发进度直到操作结束，然后刷新对象并返回结果
    ///
    /// 没有进行中的操作时返回 None。
    pub async fn wait_for_result(&mut self) -> Option<OperationResult> {
        let active = self.active.as_mut()?;
        let result = loop {
            match active.events.recv().await {
                Some(RunnerEvent::Progress(progress)) => {
                    let _ = self.notify.send(SessionEvent::Progress(progress));
                }
                Some(RunnerEvent::Finished(result)) => break result,
                None => {
                    break OperationResult::failed(
                        OperationFailure::Io,
                        None,
                        "执行线程异常退出",
                        Vec::new(),
                    )
                }
            }
        };

        let ActiveOperation { request, .. } = self.active.take()?;
        if result.succeeded {
            log::info!("{} {} 完成", request.kind, request.target);
        } else {
            log::warn!("{} {} 失败: {}", request.kind, request.target, result.message);
        }
        self.publish(SessionEvent::Finished {
            request: request.clone(),
            result: result.clone(),
        });
        self.refresh_after(&request, &result);
        self.last_result = Some(result.clone());
        Some(result)
    }

    /// 根据对象类型决定操作完成后的状态
    fn refresh_after(&mut self, request: &OperationRequest, result: &OperationResult) {
        match std::mem::take(&mut self.subject) {
            PackageSubject::File(file) => match self.backend.describe_file(&file.path) {
                Ok(refreshed) => {
                    self.set_subject(SessionState::FileLoaded, PackageSubject::File(refreshed))
                }
                Err(e) => {
                    self.publish_error(&e);
                    self.set_subject(SessionState::Idle, PackageSubject::Empty);
                }
            },
            PackageSubject::Installed(_) if result.succeeded => {
                self.set_subject(SessionState::Removed, PackageSubject::Empty);
            }
            PackageSubject::Installed(previous) => {
                match self.backend.describe_installed(&request.target) {
                    Ok(refreshed) => self.set_subject(
                        SessionState::InstalledLoaded,
                        PackageSubject::Installed(refreshed),
                    ),
                    Err(QueryError::NotFound(_)) => {
                        self.set_subject(SessionState::Removed, PackageSubject::Empty)
                    }
                    Err(e) => {
                        self.publish_error(&e);
                        self.set_subject(
                            SessionState::InstalledLoaded,
                            PackageSubject::Installed(previous),
                        );
                    }
                }
            }
            PackageSubject::Empty => self.set_subject(SessionState::Idle, PackageSubject::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::{FileSubject, InstalledSubject};
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeDb {
        installed: Vec<String>,
        versions: HashMap<String, String>,
        files: HashMap<PathBuf, String>,
        /// 仍出现在名单里、但详情查询已找不到的包
        stale: Vec<String>,
        describe_calls: usize,
    }

    #[derive(Clone, Default)]
    struct FakeBackend {
        db: Rc<RefCell<FakeDb>>,
    }

    impl FakeBackend {
        fn with_installed(names: &[&str]) -> Self {
            let backend = Self::default();
            backend.db.borrow_mut().installed = names.iter().map(|n| n.to_string()).collect();
            backend
        }

        fn add_file(&self, path: &str, name: &str) {
            self.db
                .borrow_mut()
                .files
                .insert(PathBuf::from(path), name.to_string());
        }
    }

    impl PackageBackend for FakeBackend {
        fn list_installed_names(&self) -> Result<Vec<String>, QueryError> {
            let db = self.db.borrow();
            Ok(db.installed.iter().chain(&db.stale).cloned().collect())
        }

        fn describe_installed(&self, name: &str) -> Result<InstalledSubject, QueryError> {
            let mut db = self.db.borrow_mut();
            db.describe_calls += 1;
            if !db.installed.iter().any(|n| n == name) {
                return Err(QueryError::NotFound(name.to_string()));
            }
            let version = db.versions.get(name).cloned().unwrap_or_else(|| "1.0".to_string());
            Ok(InstalledSubject {
                name: name.to_string(),
                version: version.clone(),
                summary: format!("{name} summary"),
                raw_info: format!("Name    : {name}\nVersion : {version}\n"),
            })
        }

        fn describe_file(&self, path: &Path) -> Result<FileSubject, QueryError> {
            let mut db = self.db.borrow_mut();
            db.describe_calls += 1;
            let name = db
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| QueryError::Backend(format!("error: open of {} failed", path.display())))?;
            if name.is_empty() {
                return Err(QueryError::Parse { expected: 6, found: 3 });
            }
            Ok(FileSubject {
                path: path.to_path_buf(),
                installed_elsewhere: db.installed.contains(&name),
                resolved_name: name,
                version: "2.0".to_string(),
                release: "1".to_string(),
                arch: "x86_64".to_string(),
                summary: String::new(),
                description: String::new(),
            })
        }

        fn operation_command(&self, request: &OperationRequest) -> Vec<String> {
            vec![request.kind.label().to_string(), request.target.clone()]
        }
    }

    /// 按脚本回放输出，成功时同步修改假数据库
    struct ScriptedRunner {
        db: Rc<RefCell<FakeDb>>,
        script: RefCell<VecDeque<(Vec<&'static str>, i32)>>,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(backend: &FakeBackend, script: Vec<(Vec<&'static str>, i32)>) -> Self {
            Self {
                db: Rc::clone(&backend.db),
                script: RefCell::new(script.into()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl OperationRunner for ScriptedRunner {
        fn start(&self, argv: Vec<String>) -> mpsc::UnboundedReceiver<RunnerEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            let (lines, code) = self.script.borrow_mut().pop_front().unwrap_or((vec![], 0));
            for line in &lines {
                tx.send(RunnerEvent::Progress(ProgressEvent { line: line.to_string() }))
                    .unwrap();
            }
            let transcript: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            let result = if code == 0 {
                let mut db = self.db.borrow_mut();
                let target = argv[1].clone();
                match argv[0].as_str() {
                    "Remove" => db.installed.retain(|n| *n != target),
                    _ => {
                        let name = db.files[&PathBuf::from(&target)].clone();
                        if !db.installed.contains(&name) {
                            db.installed.push(name);
                        }
                    }
                }
                OperationResult::success(transcript)
            } else {
                OperationResult::failed(
                    OperationFailure::NonZeroExit,
                    Some(code),
                    format!("exit code {code}"),
                    transcript,
                )
            };
            tx.send(RunnerEvent::Finished(result)).unwrap();
            self.calls.borrow_mut().push(argv);
            rx
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn scenario_a_ambiguous_search_waits_for_selection() {
        let backend = FakeBackend::with_installed(&["firefox", "firefox-langpacks", "vlc"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, mut rx) = Session::new(backend, runner);

        let outcome = session.search("fire").unwrap();
        let SearchOutcome::Ambiguous(set) = outcome else {
            panic!("expected candidates, got {outcome:?}");
        };
        assert_eq!(set.candidates, vec!["firefox", "firefox-langpacks"]);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.subject().is_empty());
        assert!(matches!(drain(&mut rx).as_slice(), [SessionEvent::Candidates(_)]));

        assert!(session.select_candidate("firefox-langpacks").unwrap());
        assert_eq!(session.state(), SessionState::InstalledLoaded);
        assert_eq!(session.subject().package_name(), Some("firefox-langpacks"));
        assert!(session.pending_candidates().is_none());
    }

    #[test]
    fn scenario_b_single_match_selects_immediately() {
        let backend = FakeBackend::with_installed(&["firefox", "firefox-langpacks", "vlc"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        assert_eq!(
            session.search("VLC").unwrap(),
            SearchOutcome::Selected("vlc".to_string())
        );
        assert_eq!(session.state(), SessionState::InstalledLoaded);
        match session.subject() {
            PackageSubject::Installed(i) => assert_eq!(i.name, "vlc"),
            other => panic!("unexpected subject {other:?}"),
        }
    }

    #[test]
    fn cancelled_selection_keeps_subject() {
        let backend = FakeBackend::with_installed(&["vlc", "vlc-core", "vlc-plugins"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.select_installed("vlc").unwrap();
        assert!(matches!(session.search("vlc-").unwrap(), SearchOutcome::Ambiguous(_)));
        session.cancel_selection();
        assert_eq!(session.subject().package_name(), Some("vlc"));
        assert!(matches!(
            session.select_candidate("vlc-core"),
            Err(SessionError::UnknownCandidate(_))
        ));
    }

    #[test]
    fn candidate_must_come_from_pending_set() {
        let backend = FakeBackend::with_installed(&["gimp", "gimp-libs", "vim"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.search("gimp").unwrap();
        assert!(matches!(
            session.select_candidate("vim"),
            Err(SessionError::UnknownCandidate(name)) if name == "vim"
        ));
    }

    #[test]
    fn no_results_and_empty_term() {
        let backend = FakeBackend::with_installed(&["bash"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, mut rx) = Session::new(backend, runner);

        assert!(matches!(session.search("   "), Err(SessionError::EmptySearchTerm)));
        assert_eq!(session.search("zsh").unwrap(), SearchOutcome::NoResults);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::NoResults { term: "zsh".to_string() }]
        );
    }

    #[test]
    fn not_found_is_silent() {
        let backend = FakeBackend::with_installed(&["bash"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, mut rx) = Session::new(backend, runner);

        session.select_installed("bash").unwrap();
        drain(&mut rx);
        assert!(!session.select_installed("ghost").unwrap());
        assert_eq!(session.subject().package_name(), Some("bash"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn single_match_that_vanished_is_silent_no_result() {
        let backend = FakeBackend::with_installed(&["bash"]);
        backend.db.borrow_mut().stale.push("ghost".to_string());
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, mut rx) = Session::new(backend, runner);

        session.select_installed("bash").unwrap();
        drain(&mut rx);
        assert_eq!(session.search("ghost").unwrap(), SearchOutcome::NoResults);
        assert_eq!(session.state(), SessionState::InstalledLoaded);
        assert_eq!(session.subject().package_name(), Some("bash"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn load_file_sets_action_label() {
        let backend = FakeBackend::with_installed(&["htop"]);
        backend.add_file("/tmp/htop.rpm", "htop");
        backend.add_file("/tmp/btop.rpm", "btop");
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.load_file("/tmp/htop.rpm").unwrap();
        assert_eq!(session.state(), SessionState::FileLoaded);
        assert_eq!(session.action_label(), Some("Reinstall"));

        session.load_file("/tmp/btop.rpm").unwrap();
        assert_eq!(session.action_label(), Some("Install"));
        assert_eq!(session.subject().package_name(), Some("btop"));
    }

    #[test]
    fn load_file_failure_returns_to_idle() {
        let backend = FakeBackend::with_installed(&[]);
        backend.add_file("/tmp/htop.rpm", "htop");
        backend.add_file("/tmp/broken.rpm", "");
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, mut rx) = Session::new(backend, runner);

        session.load_file("/tmp/htop.rpm").unwrap();
        drain(&mut rx);
        let err = session.load_file("/tmp/broken.rpm").unwrap_err();
        assert!(matches!(err, SessionError::Query(QueryError::Parse { .. })));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.subject().is_empty());
        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(SessionEvent::Error { .. })));

        assert!(matches!(
            session.load_file("/tmp/missing.rpm"),
            Err(SessionError::Query(QueryError::Backend(text))) if text.contains("missing.rpm")
        ));
    }

    #[tokio::test]
    async fn scenario_c_install_round_trip_marks_installed() {
        let backend = FakeBackend::with_installed(&[]);
        backend.add_file("/tmp/htop.rpm", "htop");
        let runner = ScriptedRunner::new(&backend, vec![(vec!["Installing...", "Done"], 0)]);
        let (mut session, mut rx) = Session::new(backend, runner);

        session.load_file("/tmp/htop.rpm").unwrap();
        assert_eq!(session.action_label(), Some("Install"));
        drain(&mut rx);

        let request = session.install().unwrap();
        assert_eq!(request.kind, OperationKind::Install);
        assert_eq!(request.target, "/tmp/htop.rpm");
        assert!(!request.requires_confirmation);
        assert_eq!(session.state(), SessionState::Installing);
        assert!(session.is_busy());

        let result = session.wait_for_result().await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.transcript, vec!["Installing...", "Done"]);
        assert!(!session.is_busy());
        assert_eq!(session.state(), SessionState::FileLoaded);
        match session.subject() {
            PackageSubject::File(f) => assert!(f.installed_elsewhere),
            other => panic!("unexpected subject {other:?}"),
        }
        assert_eq!(session.action_label(), Some("Reinstall"));

        let events = drain(&mut rx);
        let lines: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress(p) => Some(p.line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["Installing...", "Done"]);
        let finished = events
            .iter()
            .position(|e| matches!(e, SessionEvent::Finished { .. }))
            .unwrap();
        let last_progress = events
            .iter()
            .rposition(|e| matches!(e, SessionEvent::Progress(_)))
            .unwrap();
        assert!(finished > last_progress);
        assert!(matches!(
            &events[finished],
            SessionEvent::Finished { request: r, result } if *r == request && result.succeeded
        ));
    }

    #[tokio::test]
    async fn failed_install_still_refreshes_file() {
        let backend = FakeBackend::with_installed(&["htop"]);
        backend.add_file("/tmp/htop.rpm", "htop");
        let db = Rc::clone(&backend.db);
        let runner = ScriptedRunner::new(&backend, vec![(vec!["Error: nothing to do"], 1)]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.load_file("/tmp/htop.rpm").unwrap();
        assert_eq!(session.install().unwrap().kind, OperationKind::Reinstall);
        let calls_before = db.borrow().describe_calls;
        let result = session.wait_for_result().await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.message, "exit code 1");
        assert_eq!(db.borrow().describe_calls, calls_before + 1);
        assert_eq!(session.state(), SessionState::FileLoaded);
    }

    #[tokio::test]
    async fn scenario_d_failed_remove_refreshes_installed() {
        let backend = FakeBackend::with_installed(&["vlc"]);
        let db = Rc::clone(&backend.db);
        let runner = ScriptedRunner::new(&backend, vec![(vec!["Error: protected"], 1)]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.select_installed("vlc").unwrap();
        db.borrow_mut().versions.insert("vlc".to_string(), "3.0.21".to_string());

        let mut asked = false;
        let request = session
            .remove(|request| {
                asked = true;
                request.requires_confirmation
            })
            .unwrap()
            .unwrap();
        assert!(asked);
        assert_eq!(request.target, "vlc");
        assert_eq!(session.state(), SessionState::Removing);

        let result = session.wait_for_result().await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(session.state(), SessionState::InstalledLoaded);
        match session.subject() {
            PackageSubject::Installed(i) => assert_eq!(i.version, "3.0.21"),
            other => panic!("unexpected subject {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_remove_clears_subject() {
        let backend = FakeBackend::with_installed(&["vlc"]);
        let runner = ScriptedRunner::new(&backend, vec![(vec!["Removed vlc"], 0)]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.select_installed("vlc").unwrap();
        session.remove(|_| true).unwrap();
        let result = session.wait_for_result().await.unwrap();
        assert!(result.succeeded);
        assert_eq!(session.state(), SessionState::Removed);
        assert!(session.subject().is_empty());
        assert!(matches!(
            session.remove(|_| true),
            Err(SessionError::InvalidOperation("remove"))
        ));
    }

    #[tokio::test]
    async fn remove_on_file_subject_targets_package_name() {
        let backend = FakeBackend::with_installed(&["htop"]);
        backend.add_file("/tmp/htop.rpm", "htop");
        let runner = ScriptedRunner::new(&backend, vec![(vec![], 0)]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.load_file("/tmp/htop.rpm").unwrap();
        let request = session.remove(|_| true).unwrap().unwrap();
        assert_eq!(request.target, "htop");
        session.wait_for_result().await.unwrap();
        assert_eq!(session.state(), SessionState::FileLoaded);
        assert_eq!(session.action_label(), Some("Install"));
    }

    #[test]
    fn declined_confirmation_does_nothing() {
        let backend = FakeBackend::with_installed(&["vlc"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.select_installed("vlc").unwrap();
        assert_eq!(session.remove(|_| false).unwrap(), None);
        assert_eq!(session.state(), SessionState::InstalledLoaded);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn operations_rejected_while_busy() {
        let backend = FakeBackend::with_installed(&["vlc"]);
        backend.add_file("/tmp/a.rpm", "a");
        let runner = ScriptedRunner::new(&backend, vec![(vec!["x"], 0)]);
        let (mut session, _rx) = Session::new(backend, runner);

        session.load_file("/tmp/a.rpm").unwrap();
        session.install().unwrap();
        assert!(matches!(session.install(), Err(SessionError::Busy)));
        assert!(matches!(session.remove(|_| true), Err(SessionError::Busy)));
        assert!(matches!(session.search("vlc"), Err(SessionError::Busy)));
        assert!(matches!(session.load_file("/tmp/a.rpm"), Err(SessionError::Busy)));
        session.wait_for_result().await.unwrap();
        assert!(session.wait_for_result().await.is_none());
        assert!(session.last_result().is_some());
    }

    #[test]
    fn install_requires_file_subject() {
        let backend = FakeBackend::with_installed(&["vlc"]);
        let runner = ScriptedRunner::new(&backend, vec![]);
        let (mut session, _rx) = Session::new(backend, runner);

        assert!(matches!(session.install(), Err(SessionError::InvalidOperation("install"))));
        session.select_installed("vlc").unwrap();
        assert!(matches!(session.install(), Err(SessionError::InvalidOperation("install"))));
    }
}
