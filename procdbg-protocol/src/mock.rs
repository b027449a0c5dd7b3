//! インメモリのデバッグサーバー
//!
//! 実行トレース（行イベントごとのコールスタック列）を台本として持ち、
//! ステップ・再開・ブレークポイントをサーバーと同じ規則でシミュレートします。
//! ターゲット接続上の `execute` は、台本が最後まで進むか接続が閉じられるまでブロックします。
//! テストと CLI のシミュレーションモードで使用します。

use crate::{
    BacktraceInfo, BreakpointId, BreakpointInfo, BreakpointOperationInfo, ConnectionId,
    ConnectionProvider, DbConnection, DebuggerInterface, ProtocolError, Result, RuntimeInfo,
    SchemaId, SessionInfo,
};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const REASON_NONE: i32 = 0;
pub const REASON_INTERPRETER_STARTING: i32 = 2;
pub const REASON_BREAKPOINT: i32 = 3;
pub const REASON_LINE: i32 = 9;
pub const REASON_EXIT: i32 = 15;
pub const REASON_ABORT: i32 = 21;
pub const REASON_KNL_EXIT: i32 = 25;

/// synchronize がターゲット開始を待つ上限
const SYNCHRONIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// 理由コードの説明文
pub fn describe_reason(code: i32) -> &'static str {
    match code {
        REASON_NONE => "none",
        REASON_INTERPRETER_STARTING => "Interpreter is starting",
        REASON_BREAKPOINT => "Hit a breakpoint",
        6 => "Procedure entry",
        7 => "Procedure is about to return",
        8 => "Procedure is finished",
        REASON_LINE => "Reached a new line",
        10 => "An interrupt occurred",
        11 => "An exception was raised",
        REASON_EXIT => "Interpreter is exiting",
        16 => "Start exception-handler",
        17 => "A timeout occurred",
        20 => "Instantiation block",
        REASON_ABORT => "Interpreter is aborting",
        REASON_KNL_EXIT => "Kernel is exiting",
        _ => "unknown reason",
    }
}

/// コールスタックを `(owner, program, line)` の列（内側が先頭）から作成する
pub fn stack(frames: &[(&str, &str, u32)]) -> Vec<RuntimeInfo> {
    frames
        .iter()
        .map(|(owner, program, line)| RuntimeInfo::at(owner, program, *line))
        .collect()
}

/// サーバーが受け付けた呼び出しの記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub op: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone)]
struct MockBreakpoint {
    owner: String,
    program: String,
    line: u32,
    enabled: bool,
}

#[derive(Default)]
struct MockState {
    trace: Vec<Vec<RuntimeInfo>>,
    cursor: Option<usize>,
    finished: bool,
    cancelled: bool,
    target_aborted: bool,
    target_running: bool,
    target_started: usize,
    target_failure: Option<ProtocolError>,
    session_counter: u32,
    session_id: Option<String>,
    debugging_enabled: bool,
    attached: bool,
    breakpoints: HashMap<BreakpointId, MockBreakpoint>,
    next_breakpoint_id: BreakpointId,
    failures: HashMap<&'static str, VecDeque<ProtocolError>>,
    persistent_failures: HashMap<&'static str, ProtocolError>,
    rejected_lines: HashMap<u32, String>,
    stale_reports: usize,
    stuck: bool,
    step_delay: Duration,
    journal: Vec<JournalEntry>,
}

impl MockState {
    fn record(&mut self, op: &'static str, detail: String) -> Result<()> {
        self.journal.push(JournalEntry { op, detail });
        if let Some(err) = self.failures.get_mut(op).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if let Some(err) = self.persistent_failures.get(op) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    fn top(&self, index: usize) -> RuntimeInfo {
        self.trace[index][0].clone()
    }

    fn breakpoint_hit(&self, frame: &RuntimeInfo) -> bool {
        self.breakpoints.values().any(|bp| {
            bp.enabled
                && Some(bp.owner.as_str()) == frame.owner.as_deref()
                && Some(bp.program.as_str()) == frame.program.as_deref()
                && bp.line == frame.line
        })
    }

    /// 停止条件を満たす次の行イベントを探す
    ///
    /// 有効なブレークポイントは常に停止条件になります。
    fn next_stop(
        &self,
        depth_limit: Option<usize>,
        target: Option<(&str, &str, u32)>,
    ) -> Option<(usize, i32)> {
        let from = self.cursor.map(|c| c + 1).unwrap_or(0);
        for j in from..self.trace.len() {
            let frames = &self.trace[j];
            let top = &frames[0];
            if self.breakpoint_hit(top) {
                return Some((j, REASON_BREAKPOINT));
            }
            if let Some(limit) = depth_limit {
                if frames.len() <= limit {
                    return Some((j, REASON_LINE));
                }
            }
            if let Some((owner, program, line)) = target {
                if top.owner.as_deref() == Some(owner)
                    && top.program.as_deref() == Some(program)
                    && top.line == line
                {
                    return Some((j, REASON_LINE));
                }
            }
        }
        None
    }

    fn current_depth(&self) -> usize {
        self.cursor.map(|c| self.trace[c].len()).unwrap_or(0)
    }
}

/// インメモリのデバッグサーバー
pub struct MockDebugger {
    state: Mutex<MockState>,
    changed: Condvar,
}

impl MockDebugger {
    /// 実行トレースからサーバーを作成する
    ///
    /// 空のコールスタックは無視されます。
    pub fn new(trace: Vec<Vec<RuntimeInfo>>) -> Self {
        let state = MockState {
            trace: trace.into_iter().filter(|frames| !frames.is_empty()).collect(),
            next_breakpoint_id: 1,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        }
    }

    /// 次の `op` 呼び出しを一度だけ失敗させる
    pub fn fail_next(&self, op: &'static str, err: ProtocolError) {
        self.state.lock().failures.entry(op).or_default().push_back(err);
    }

    /// `op` 呼び出しを常に失敗させる
    pub fn fail_always(&self, op: &'static str, err: ProtocolError) {
        self.state.lock().persistent_failures.insert(op, err);
    }

    /// 指定行へのブレークポイント追加をサーバーエラー文字列で拒否する
    pub fn reject_breakpoint_at(&self, line: u32, error: &str) {
        self.state.lock().rejected_lines.insert(line, error.to_string());
    }

    /// デバッグ対象が最後に例外を投げるようにする
    pub fn fail_target(&self, err: ProtocolError) {
        self.state.lock().target_failure = Some(err);
    }

    /// 次の `count` 回の停止で、実際の位置ではなく直前の位置を報告する
    pub fn report_stale_positions(&self, count: usize) {
        self.state.lock().stale_reports = count;
    }

    /// ステップ操作が位置を進めず、終了も報告しないようにする
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }

    /// 各ステップ操作のネットワーク遅延をシミュレートする
    pub fn set_step_delay(&self, delay: Duration) {
        self.state.lock().step_delay = delay;
    }

    /// 呼び出し記録を取得する
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.clone()
    }

    /// 指定操作の呼び出し回数
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().journal.iter().filter(|e| e.op == op).count()
    }

    /// 指定操作の呼び出し詳細の一覧
    pub fn calls(&self, op: &str) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|e| e.op == op)
            .map(|e| e.detail.clone())
            .collect()
    }

    /// デバッグ接続がアタッチされているか
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// 台本が最後まで進んだか
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// ターゲットの実行が開始された回数
    pub fn target_started(&self) -> usize {
        self.state.lock().target_started
    }

    /// サーバーに残っているブレークポイント (id, line, enabled)
    pub fn resident_breakpoints(&self) -> Vec<(BreakpointId, u32, bool)> {
        let st = self.state.lock();
        let mut v: Vec<_> = st
            .breakpoints
            .iter()
            .map(|(id, bp)| (*id, bp.line, bp.enabled))
            .collect();
        v.sort();
        v
    }

    /// ターゲット接続上でデバッグ対象を実行する
    fn run_target(&self, connection_id: u64, statement: &str) -> Result<()> {
        let mut st = self.state.lock();
        st.record("execute", statement.to_string())?;
        st.target_started += 1;

        if !st.attached || st.trace.is_empty() {
            st.finish();
        } else {
            st.target_running = true;
        }
        self.changed.notify_all();

        while !st.finished && !st.target_aborted {
            self.changed.wait(&mut st);
        }
        st.target_running = false;
        self.changed.notify_all();

        if st.target_aborted {
            return Err(ProtocolError::ConnectionClosed(connection_id));
        }
        if st.cancelled {
            return Err(ProtocolError::database_with_code(
                1013,
                "user requested cancel of current operation",
            ));
        }
        match st.target_failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn target_connection_closed(&self) {
        let mut st = self.state.lock();
        if !st.finished {
            st.target_aborted = true;
        }
        self.changed.notify_all();
    }

    /// ステップ系操作の共通処理
    fn step<F>(&self, op: &'static str, debug: &dyn DbConnection, find: F) -> Result<RuntimeInfo>
    where
        F: FnOnce(&MockState) -> Option<(usize, i32)>,
    {
        ensure_open(debug)?;
        let delay = {
            let mut st = self.state.lock();
            st.record(op, String::new())?;
            st.step_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut st = self.state.lock();
        if st.finished {
            return Ok(RuntimeInfo::terminated(REASON_EXIT));
        }
        let Some(current) = st.cursor else {
            return Err(ProtocolError::database("target session is not synchronized"));
        };
        if st.stuck {
            return Ok(st.top(current).with_reason(REASON_LINE));
        }

        let info = match find(&*st) {
            Some((next, reason)) => {
                st.cursor = Some(next);
                if st.stale_reports > 0 {
                    st.stale_reports -= 1;
                    st.top(current).with_reason(reason)
                } else {
                    st.top(next).with_reason(reason)
                }
            }
            None => {
                st.finish();
                RuntimeInfo::terminated(REASON_EXIT)
            }
        };
        self.changed.notify_all();
        debug!(op, position = %info, "mock step");
        Ok(info)
    }
}

fn ensure_open(connection: &dyn DbConnection) -> Result<()> {
    if connection.is_closed() {
        return Err(ProtocolError::ConnectionClosed(connection.id()));
    }
    Ok(())
}

impl DebuggerInterface for MockDebugger {
    fn initialize_session(&self, target: &dyn DbConnection) -> Result<SessionInfo> {
        ensure_open(target)?;
        let mut st = self.state.lock();
        st.record("initialize_session", String::new())?;
        st.session_counter += 1;
        let session_id = format!("MOCK-{:04}", st.session_counter);
        st.session_id = Some(session_id.clone());
        Ok(SessionInfo { session_id })
    }

    fn enable_debugging(&self, target: &dyn DbConnection) -> Result<()> {
        ensure_open(target)?;
        let mut st = self.state.lock();
        st.record("enable_debugging", String::new())?;
        st.debugging_enabled = true;
        Ok(())
    }

    fn disable_debugging(&self, target: &dyn DbConnection) -> Result<()> {
        ensure_open(target)?;
        let mut st = self.state.lock();
        st.record("disable_debugging", String::new())?;
        st.debugging_enabled = false;
        Ok(())
    }

    fn attach_session(&self, session_id: &str, debug: &dyn DbConnection) -> Result<()> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("attach_session", session_id.to_string())?;
        if st.session_id.as_deref() != Some(session_id) {
            return Err(ProtocolError::database_with_code(
                20000,
                format!("unknown debug session {}", session_id),
            ));
        }
        if !st.debugging_enabled {
            return Err(ProtocolError::database("debugging is not enabled on target session"));
        }
        st.attached = true;
        Ok(())
    }

    fn detach_session(&self, debug: &dyn DbConnection) -> Result<()> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("detach_session", String::new())?;
        st.attached = false;
        // デタッチ後のターゲットはデバッガなしで最後まで走る
        st.finish();
        self.changed.notify_all();
        Ok(())
    }

    fn synchronize_session(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("synchronize_session", String::new())?;

        let deadline = Instant::now() + SYNCHRONIZE_TIMEOUT;
        while !st.target_running && !st.finished && !st.target_aborted {
            if self.changed.wait_until(&mut st, deadline).timed_out() {
                return Err(ProtocolError::database_with_code(
                    10162,
                    "timed out waiting for target session",
                ));
            }
        }
        if st.finished || st.target_aborted {
            return Ok(RuntimeInfo::terminated(REASON_EXIT));
        }
        let current = match st.cursor {
            Some(c) => c,
            None => {
                st.cursor = Some(0);
                0
            }
        };
        Ok(st.top(current).with_reason(REASON_INTERPRETER_STARTING))
    }

    fn add_program_breakpoint(
        &self,
        schema: &str,
        program: &str,
        object_type: &str,
        line: u32,
        debug: &dyn DbConnection,
    ) -> Result<BreakpointInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record(
            "add_program_breakpoint",
            format!("{} {}.{}:{}", object_type, schema, program, line),
        )?;
        if let Some(error) = st.rejected_lines.get(&line) {
            return Ok(BreakpointInfo::rejected(error.clone()));
        }

        let existing = st
            .breakpoints
            .iter()
            .find(|(_, bp)| bp.owner == schema && bp.program == program && bp.line == line)
            .map(|(id, _)| *id);
        if let Some(id) = existing {
            if let Some(bp) = st.breakpoints.get_mut(&id) {
                bp.enabled = true;
            }
            return Ok(BreakpointInfo::ok(id));
        }

        let id = st.next_breakpoint_id;
        st.next_breakpoint_id += 1;
        st.breakpoints.insert(
            id,
            MockBreakpoint {
                owner: schema.to_string(),
                program: program.to_string(),
                line,
                enabled: true,
            },
        );
        Ok(BreakpointInfo::ok(id))
    }

    fn remove_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("remove_breakpoint", id.to_string())?;
        match st.breakpoints.remove(&id) {
            Some(_) => Ok(BreakpointOperationInfo::ok()),
            None => Ok(BreakpointOperationInfo::failed("no such breakpoint")),
        }
    }

    fn enable_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("enable_breakpoint", id.to_string())?;
        match st.breakpoints.get_mut(&id) {
            Some(bp) => {
                bp.enabled = true;
                Ok(BreakpointOperationInfo::ok())
            }
            None => Ok(BreakpointOperationInfo::failed("no such breakpoint")),
        }
    }

    fn disable_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("disable_breakpoint", id.to_string())?;
        match st.breakpoints.get_mut(&id) {
            Some(bp) => {
                bp.enabled = false;
                Ok(BreakpointOperationInfo::ok())
            }
            None => Ok(BreakpointOperationInfo::failed("no such breakpoint")),
        }
    }

    fn step_over(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        self.step("step_over", debug, |st| {
            st.next_stop(Some(st.current_depth()), None)
        })
    }

    fn step_into(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        self.step("step_into", debug, |st| st.next_stop(Some(usize::MAX), None))
    }

    fn step_out(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        self.step("step_out", debug, |st| {
            st.next_stop(Some(st.current_depth().saturating_sub(1)), None)
        })
    }

    fn run_to_position(
        &self,
        schema: &str,
        program: &str,
        _object_type: &str,
        line: u32,
        debug: &dyn DbConnection,
    ) -> Result<RuntimeInfo> {
        self.step("run_to_position", debug, |st| {
            st.next_stop(None, Some((schema, program, line)))
        })
    }

    fn resume_execution(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        self.step("resume_execution", debug, |st| st.next_stop(None, None))
    }

    fn stop_execution(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("stop_execution", String::new())?;
        if !st.finished {
            st.cancelled = true;
            st.finish();
            self.changed.notify_all();
        }
        Ok(RuntimeInfo::terminated(REASON_ABORT))
    }

    fn execution_backtrace(&self, debug: &dyn DbConnection) -> Result<BacktraceInfo> {
        ensure_open(debug)?;
        let mut st = self.state.lock();
        st.record("execution_backtrace", String::new())?;
        if st.finished {
            return Ok(BacktraceInfo::default());
        }
        let frames = st.cursor.map(|c| st.trace[c].clone()).unwrap_or_default();
        Ok(BacktraceInfo::new(frames))
    }

    fn runtime_event_reason(&self, code: i32) -> String {
        describe_reason(code).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Target,
    Debug,
}

/// モックサーバーへの接続
pub struct MockConnection {
    id: u64,
    role: Role,
    closed: AtomicBool,
    auto_commit: AtomicBool,
    server: Arc<MockDebugger>,
}

impl MockConnection {
    /// 自動コミットが有効かどうか
    pub fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }
}

impl DbConnection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        ensure_open(self)?;
        self.auto_commit.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&self, statement: &str) -> Result<()> {
        ensure_open(self)?;
        match self.role {
            Role::Target => self.server.run_target(self.id, statement),
            Role::Debug => Ok(()),
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) && self.role == Role::Target {
            self.server.target_connection_closed();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// モックサーバーに接続を供給する接続ハンドラ
pub struct MockConnectionProvider {
    id: ConnectionId,
    name: String,
    server: Arc<MockDebugger>,
    next_connection_id: AtomicU64,
    opened: AtomicU64,
    released: AtomicU64,
}

impl MockConnectionProvider {
    pub fn new(id: ConnectionId, name: &str, server: Arc<MockDebugger>) -> Self {
        Self {
            id,
            name: name.to_string(),
            server,
            next_connection_id: AtomicU64::new(1),
            opened: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// 背後のモックサーバー
    pub fn server(&self) -> &Arc<MockDebugger> {
        &self.server
    }

    /// 取得された接続の数
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// 解放された接続の数
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    fn open(&self, role: Role, op: &'static str) -> Result<Arc<dyn DbConnection>> {
        self.server.state.lock().record(op, String::new())?;
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            id,
            role,
            closed: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
            server: Arc::clone(&self.server),
        }))
    }
}

impl ConnectionProvider for MockConnectionProvider {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn debugger(&self) -> Arc<dyn DebuggerInterface> {
        self.server.clone()
    }

    fn target_connection(&self, schema: &SchemaId) -> Result<Arc<dyn DbConnection>> {
        debug!(%schema, "opening mock target connection");
        self.open(Role::Target, "target_connection")
    }

    fn debug_connection(&self) -> Result<Arc<dyn DbConnection>> {
        self.open(Role::Debug, "debug_connection")
    }

    fn release(&self, connection: Arc<dyn DbConnection>) {
        connection.close();
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Vec<Vec<RuntimeInfo>> {
        vec![
            stack(&[("HR", "ANON", 1)]),
            stack(&[("HR", "PAY_RAISE", 3), ("HR", "ANON", 1)]),
            stack(&[("HR", "PAY_RAISE", 4), ("HR", "ANON", 1)]),
            stack(&[("HR", "BONUS", 2), ("HR", "PAY_RAISE", 4), ("HR", "ANON", 1)]),
            stack(&[("HR", "PAY_RAISE", 5), ("HR", "ANON", 1)]),
            stack(&[("HR", "ANON", 2)]),
        ]
    }

    /// ターゲットを別スレッドで起動し、同期済みのデバッグ接続を返す
    fn attached(server: &Arc<MockDebugger>) -> (MockConnectionProvider, Arc<dyn DbConnection>, std::thread::JoinHandle<Result<()>>) {
        let provider = MockConnectionProvider::new(ConnectionId(1), "mock", Arc::clone(server));
        let target = provider.target_connection(&SchemaId::new("hr")).unwrap();
        let debug = provider.debug_connection().unwrap();
        let session = server.initialize_session(target.as_ref()).unwrap();
        server.enable_debugging(target.as_ref()).unwrap();
        server.attach_session(&session.session_id, debug.as_ref()).unwrap();
        let runner = std::thread::spawn(move || target.execute("BEGIN HR.ANON; END;"));
        (provider, debug, runner)
    }

    #[test]
    fn test_step_over_skips_deeper_frames() {
        let server = Arc::new(MockDebugger::new(program()));
        let (_provider, debug, runner) = attached(&server);

        let info = server.synchronize_session(debug.as_ref()).unwrap();
        assert_eq!(info.line, 1);
        let info = server.step_into(debug.as_ref()).unwrap();
        assert_eq!((info.program.as_deref(), info.line), (Some("PAY_RAISE"), 3));
        let info = server.step_over(debug.as_ref()).unwrap();
        assert_eq!(info.line, 4);
        let info = server.step_over(debug.as_ref()).unwrap();
        assert_eq!((info.program.as_deref(), info.line), (Some("PAY_RAISE"), 5));
        let info = server.step_out(debug.as_ref()).unwrap();
        assert_eq!((info.program.as_deref(), info.line), (Some("ANON"), 2));
        let info = server.resume_execution(debug.as_ref()).unwrap();
        assert!(info.terminated);

        assert!(runner.join().unwrap().is_ok());
    }

    #[test]
    fn test_resume_stops_at_breakpoint() {
        let server = Arc::new(MockDebugger::new(program()));
        let (_provider, debug, runner) = attached(&server);

        let bp = server
            .add_program_breakpoint("HR", "BONUS", "FUNCTION", 2, debug.as_ref())
            .unwrap();
        assert_eq!(bp.breakpoint_id, Some(1));
        // 同じ位置への追加は同じIDを返す
        let again = server
            .add_program_breakpoint("HR", "BONUS", "FUNCTION", 2, debug.as_ref())
            .unwrap();
        assert_eq!(again.breakpoint_id, Some(1));

        server.synchronize_session(debug.as_ref()).unwrap();
        let info = server.resume_execution(debug.as_ref()).unwrap();
        assert_eq!((info.program.as_deref(), info.line, info.reason), (Some("BONUS"), 2, REASON_BREAKPOINT));
        let bt = server.execution_backtrace(debug.as_ref()).unwrap();
        assert_eq!(bt.depth(), 3);

        let info = server.resume_execution(debug.as_ref()).unwrap();
        assert!(info.terminated);
        assert!(runner.join().unwrap().is_ok());
    }

    #[test]
    fn test_closing_target_connection_unblocks_execution() {
        let server = Arc::new(MockDebugger::new(program()));
        let provider = MockConnectionProvider::new(ConnectionId(1), "mock", Arc::clone(&server));
        let target = provider.target_connection(&SchemaId::new("hr")).unwrap();
        let debug = provider.debug_connection().unwrap();
        let session = server.initialize_session(target.as_ref()).unwrap();
        server.enable_debugging(target.as_ref()).unwrap();
        server.attach_session(&session.session_id, debug.as_ref()).unwrap();

        let runner_target = Arc::clone(&target);
        let runner = std::thread::spawn(move || runner_target.execute("BEGIN NULL; END;"));
        server.synchronize_session(debug.as_ref()).unwrap();

        provider.release(target);
        let result = runner.join().unwrap();
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
        assert_eq!(provider.released_count(), 1);
    }

    #[test]
    fn test_fail_next_is_consumed_once() {
        let server = Arc::new(MockDebugger::new(program()));
        server.fail_next("remove_breakpoint", ProtocolError::database("boom"));
        let provider = MockConnectionProvider::new(ConnectionId(1), "mock", Arc::clone(&server));
        let debug = provider.debug_connection().unwrap();
        assert!(server.remove_breakpoint(1, debug.as_ref()).is_err());
        assert!(server.remove_breakpoint(1, debug.as_ref()).is_ok());
        assert_eq!(server.call_count("remove_breakpoint"), 2);
    }

    #[test]
    fn test_describe_reason() {
        assert_eq!(describe_reason(REASON_EXIT), "Interpreter is exiting");
        assert_eq!(describe_reason(-1), "unknown reason");
    }
}
