//! シナリオテスト用の共通ヘルパー

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use procdbg_core::{
    BreakpointStatus, BreakpointStore, DebugController, DebugHost, DebugTarget, EntryPointResolver,
    ExecutionInput, LineBreakpoint, MethodTarget, NotificationLevel, SessionConfig,
    SessionContext, SessionRegistry, SuspendContext,
};
use procdbg_protocol::mock::{stack, MockConnectionProvider, MockDebugger};
use procdbg_protocol::{ConnectionId, ObjectType, ProgramPosition, RuntimeInfo, SchemaId};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CONN: ConnectionId = ConnectionId(1);
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// ホストが受け取ったイベント
#[derive(Debug, Clone)]
pub enum HostEvent {
    Position(SuspendContext),
    StopRequested,
    Notify(NotificationLevel, String),
    Breakpoint(String, u32, BreakpointStatus),
}

/// すべてのコールバックを記録するホスト
#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    changed: Condvar,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: HostEvent) {
        self.events.lock().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn positions(&self) -> Vec<SuspendContext> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Position(ctx) => Some(ctx),
                _ => None,
            })
            .collect()
    }

    pub fn position_lines(&self) -> Vec<u32> {
        self.positions().iter().map(|ctx| ctx.runtime.line).collect()
    }

    pub fn notifications(&self, level: NotificationLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Notify(l, message) if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn breakpoint_statuses(&self) -> Vec<(u32, BreakpointStatus)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Breakpoint(_, line, status) => Some((line, status)),
                _ => None,
            })
            .collect()
    }

    pub fn stop_requests(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, HostEvent::StopRequested))
            .count()
    }

    /// 条件を満たすまで待つ
    pub fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&[HostEvent]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !condition(&events) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return condition(&events);
            }
        }
        true
    }

    /// 停止位置が `count` 個報告されるまで待ち、報告された行を返す
    pub fn wait_for_positions(&self, count: usize) -> Vec<u32> {
        let reached = self.wait_until(TIMEOUT, |events| {
            events
                .iter()
                .filter(|e| matches!(e, HostEvent::Position(_)))
                .count()
                >= count
        });
        assert!(reached, "expected {} positions, got {:?}", count, self.position_lines());
        self.position_lines()
    }

    /// 指定レベルの通知が届くまで待つ
    pub fn wait_for_notification(&self, level: NotificationLevel, needle: &str) -> bool {
        self.wait_until(TIMEOUT, |events| {
            events.iter().any(|e| match e {
                HostEvent::Notify(l, message) => *l == level && message.contains(needle),
                _ => false,
            })
        })
    }
}

impl DebugHost for RecordingHost {
    fn position_reached(&self, context: &SuspendContext) {
        self.push(HostEvent::Position(context.clone()));
    }

    fn stop_requested(&self) {
        self.push(HostEvent::StopRequested);
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.push(HostEvent::Notify(level, message.to_string()));
    }

    fn breakpoint_updated(&self, breakpoint: &LineBreakpoint, status: &BreakpointStatus) {
        self.push(HostEvent::Breakpoint(
            breakpoint.file.clone(),
            breakpoint.line,
            status.clone(),
        ));
    }
}

/// 一度開くと開いたままになる待ち合わせ
#[derive(Default)]
pub struct Latch {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    /// 開くまで待つ。タイムアウトした場合は `false`
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut open = self.open.lock();
        while !*open {
            if self.changed.wait_until(&mut open, deadline).timed_out() {
                return *open;
            }
        }
        true
    }
}

/// 特定のメッセージで呼び出し元のワーカーを止めるホスト
///
/// イベントはすべて `inner` に記録されます。
pub struct GatedHost {
    pub inner: Arc<RecordingHost>,
    pub latch: Arc<Latch>,
    pause_at: String,
    resume_on: Option<String>,
}

impl GatedHost {
    /// `pause_at` を通知したワーカーを `latch` が開くまで止める
    pub fn pausing_at(inner: Arc<RecordingHost>, pause_at: &str) -> Self {
        Self {
            inner,
            latch: Latch::new(),
            pause_at: pause_at.to_string(),
            resume_on: None,
        }
    }

    /// `prefix` で始まる警告が届いたら `latch` を開く
    ///
    /// 警告を出したワーカーは少し待ってから処理を続けます。
    pub fn resuming_on_warning(mut self, prefix: &str) -> Self {
        self.resume_on = Some(prefix.to_string());
        self
    }
}

impl DebugHost for GatedHost {
    fn position_reached(&self, context: &SuspendContext) {
        self.inner.position_reached(context);
    }

    fn stop_requested(&self) {
        self.inner.stop_requested();
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.inner.notify(level, message);
        if level == NotificationLevel::Warning
            && self.resume_on.as_deref().map_or(false, |p| message.starts_with(p))
        {
            self.latch.open();
            std::thread::sleep(Duration::from_millis(200));
        }
        if message == self.pause_at {
            self.latch.wait(TIMEOUT);
        }
    }

    fn breakpoint_updated(&self, breakpoint: &LineBreakpoint, status: &BreakpointStatus) {
        self.inner.breakpoint_updated(breakpoint, status);
    }
}

/// 固定行を入口とするリゾルバ
pub struct FixedEntry(pub u32);

impl EntryPointResolver for FixedEntry {
    fn resolve_entry(&self, target: &MethodTarget) -> Option<ProgramPosition> {
        Some(ProgramPosition::new(
            &target.schema,
            &target.program,
            target.object_type,
            self.0,
        ))
    }
}

/// HR.PAY_RAISE の実行トレース
///
/// 10行目で HR.BONUS を呼び出します。
pub fn pay_raise_trace() -> Vec<Vec<RuntimeInfo>> {
    vec![
        stack(&[("HR", "ANON", 1)]),
        stack(&[("HR", "PAY_RAISE", 3), ("HR", "ANON", 1)]),
        stack(&[("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)]),
        stack(&[("HR", "BONUS", 2), ("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)]),
        stack(&[("HR", "BONUS", 3), ("HR", "PAY_RAISE", 10), ("HR", "ANON", 1)]),
        stack(&[("HR", "PAY_RAISE", 11), ("HR", "ANON", 1)]),
        stack(&[("HR", "PAY_RAISE", 12), ("HR", "ANON", 1)]),
        stack(&[("HR", "PAY_RAISE", 13), ("HR", "ANON", 1)]),
        stack(&[("HR", "ANON", 2)]),
    ]
}

/// モックサーバーとホストをまとめたテスト環境
pub struct Fixture {
    pub server: Arc<MockDebugger>,
    pub provider: Arc<MockConnectionProvider>,
    pub host: Arc<RecordingHost>,
    pub store: Arc<BreakpointStore>,
    pub registry: Arc<SessionRegistry>,
    pub entry: Option<u32>,
}

impl Fixture {
    pub fn new(trace: Vec<Vec<RuntimeInfo>>) -> Self {
        let server = Arc::new(MockDebugger::new(trace));
        let provider = Arc::new(MockConnectionProvider::new(CONN, "mock", Arc::clone(&server)));
        Self {
            server,
            provider,
            host: RecordingHost::new(),
            store: Arc::new(BreakpointStore::new()),
            registry: Arc::new(SessionRegistry::new()),
            entry: None,
        }
    }

    pub fn pay_raise() -> Self {
        Self::new(pay_raise_trace())
    }

    pub fn with_entry(mut self, line: u32) -> Self {
        self.entry = Some(line);
        self
    }

    pub fn breakpoint(&self, line: u32) -> LineBreakpoint {
        LineBreakpoint::new(
            "pay_raise.prc",
            CONN,
            ProgramPosition::new("HR", "PAY_RAISE", ObjectType::Procedure, line),
        )
    }

    pub fn add_breakpoint(&self, line: u32) -> LineBreakpoint {
        let bp = self.breakpoint(line);
        self.store.add(bp.clone());
        bp
    }

    pub fn config() -> SessionConfig {
        SessionConfig {
            rollout_budget_ms: 2_000,
            ..SessionConfig::default()
        }
    }

    pub fn controller(&self, config: SessionConfig) -> DebugController {
        self.controller_with_host(config, self.host.clone())
    }

    pub fn controller_with_host(&self, config: SessionConfig, host: Arc<dyn DebugHost>) -> DebugController {
        let target = DebugTarget::Method(
            MethodTarget::new("HR", "PAY_RAISE", ObjectType::Procedure)
                .with_argument("P_EMP_ID", "100"),
        );
        let input = ExecutionInput::new(target, SchemaId::new("hr"));
        let mut context = SessionContext::new(self.provider.clone(), host)
            .with_breakpoints(Arc::clone(&self.store))
            .with_registry(Arc::clone(&self.registry))
            .with_config(config);
        if let Some(line) = self.entry {
            context = context.with_entry_resolver(Arc::new(FixedEntry(line)));
        }
        DebugController::new(input, context)
    }

    /// セッションを作成して初期化を開始する
    pub fn start_with(&self, config: SessionConfig) -> DebugController {
        let controller = self.controller(config);
        controller
            .session_initialized()
            .expect("Failed to start session initialization");
        controller
    }

    pub fn start(&self) -> DebugController {
        self.start_with(Self::config())
    }
}

/// キャッシュされた停止位置がバックトレースの先頭と一致していること
pub fn assert_runtime_matches_backtrace(controller: &DebugController) {
    let runtime = controller.runtime_info().expect("no runtime info");
    let backtrace = controller.backtrace().expect("no backtrace");
    let top = backtrace.top().expect("empty backtrace");
    assert!(
        runtime.is_same_location(top),
        "cached {} differs from backtrace top {}",
        runtime,
        top
    );
}
