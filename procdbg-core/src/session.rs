//! デバッグセッション
//!
//! 初期化・同期・停止（ティアダウン）の各フェーズをワーカースレッド上で進めます。
//! ステップ操作は `executor`、ターゲット実行は `runner`、
//! ロールアウトは `rollout` に分かれています。

use crate::breakpoint::{BreakpointRegistry, BreakpointStore};
use crate::config::SessionConfig;
use crate::errors::{DebugError, MSG_INITIALIZATION_FAILED};
use crate::host::{DebugHost, EntryPointResolver, NoEntryPoint, NotificationLevel};
use crate::registry::SessionRegistry;
use crate::runtime::RuntimeState;
use crate::status::{SessionPhase, SessionStatus, StatusFlag};
use crate::target::ExecutionInput;
use parking_lot::Mutex;
use procdbg_protocol::{ConnectionId, ConnectionProvider, DbConnection, DebuggerInterface};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// セッションを組み立てるための協調オブジェクト
pub struct SessionContext {
    pub provider: Arc<dyn ConnectionProvider>,
    pub host: Arc<dyn DebugHost>,
    pub entry_resolver: Arc<dyn EntryPointResolver>,
    pub breakpoints: Arc<BreakpointStore>,
    pub registry: Arc<SessionRegistry>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn ConnectionProvider>, host: Arc<dyn DebugHost>) -> Self {
        Self {
            provider,
            host,
            entry_resolver: Arc::new(NoEntryPoint),
            breakpoints: Arc::new(BreakpointStore::new()),
            registry: Arc::new(SessionRegistry::new()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_entry_resolver(mut self, resolver: Arc<dyn EntryPointResolver>) -> Self {
        self.entry_resolver = resolver;
        self
    }

    pub fn with_breakpoints(mut self, breakpoints: Arc<BreakpointStore>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

/// セッションが保持する二本の接続
///
/// 解放後に届いた接続はその場で返却されます。
#[derive(Default)]
struct Connections {
    target: Option<Arc<dyn DbConnection>>,
    debug: Option<Arc<dyn DbConnection>>,
    released: bool,
}

type Slot = fn(&mut Connections) -> &mut Option<Arc<dyn DbConnection>>;

/// デバッグセッションの共有状態
pub(crate) struct DebugSession {
    pub(crate) input: ExecutionInput,
    pub(crate) config: SessionConfig,
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) debugger: Arc<dyn DebuggerInterface>,
    pub(crate) host: Arc<dyn DebugHost>,
    pub(crate) entry_resolver: Arc<dyn EntryPointResolver>,
    pub(crate) store: Arc<BreakpointStore>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) status: SessionStatus,
    pub(crate) runtime: RuntimeState,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) target_launched: AtomicBool,
    connections: Mutex<Connections>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DebugSession {
    pub(crate) fn new(input: ExecutionInput, context: SessionContext) -> Arc<Self> {
        let debugger = context.provider.debugger();
        let session = Arc::new(Self {
            input,
            config: context.config,
            provider: context.provider,
            debugger,
            host: context.host,
            entry_resolver: context.entry_resolver,
            store: context.breakpoints,
            registry: context.registry,
            status: SessionStatus::new(),
            runtime: RuntimeState::new(),
            breakpoints: BreakpointRegistry::new(),
            target_launched: AtomicBool::new(false),
            connections: Mutex::new(Connections::default()),
            workers: Mutex::new(Vec::new()),
        });
        session.registry.register_debug_session(session.connection_id());
        session
    }

    pub(crate) fn connection_id(&self) -> ConnectionId {
        self.provider.id()
    }

    /// 終了処理中または終了済み
    pub(crate) fn is_stopping(&self) -> bool {
        self.status.is(StatusFlag::Terminating) || self.status.is(StatusFlag::Terminated)
    }

    pub(crate) fn debug_connection(&self) -> Result<Arc<dyn DbConnection>, DebugError> {
        self.connections
            .lock()
            .debug
            .clone()
            .ok_or(DebugError::NotConnected("debug"))
    }

    pub(crate) fn target_connection(&self) -> Result<Arc<dyn DbConnection>, DebugError> {
        self.connections
            .lock()
            .target
            .clone()
            .ok_or(DebugError::NotConnected("target"))
    }

    fn adopt_connection(&self, connection: Arc<dyn DbConnection>, slot: Slot) -> Result<(), DebugError> {
        let mut connections = self.connections.lock();
        if connections.released {
            drop(connections);
            self.provider.release(connection);
            return Err(DebugError::Terminated);
        }
        *slot(&mut connections) = Some(connection);
        Ok(())
    }

    fn release_connections(&self) {
        let (debug, target) = {
            let mut connections = self.connections.lock();
            connections.released = true;
            (connections.debug.take(), connections.target.take())
        };
        if let Some(connection) = debug {
            self.provider.release(connection);
        }
        if let Some(connection) = target {
            self.provider.release(connection);
        }
    }

    /// 名前付きワーカースレッドを起動する
    pub(crate) fn spawn_worker<F>(&self, name: &str, f: F) -> Result<(), DebugError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.config.thread_name_prefix, name))
            .spawn(f)?;
        let mut workers = self.workers.lock();
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
        Ok(())
    }

    /// 起動済みのワーカーがすべて終わるまで待つ
    pub(crate) fn join_workers(&self) {
        let current = thread::current().id();
        loop {
            let handles = std::mem::take(&mut *self.workers.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.thread().id() == current {
                    continue;
                }
                if handle.join().is_err() {
                    warn!(connection = %self.connection_id(), "debugger worker panicked");
                }
            }
        }
    }

    /// セッションコンソールへの出力
    pub(crate) fn console(&self, message: &str) {
        info!(connection = %self.connection_id(), "{}", message);
        self.host.notify(NotificationLevel::Info, message);
    }

    /// ホストにセッション停止を要求し、自身も停止する
    pub(crate) fn request_stop(self: &Arc<Self>) {
        self.host.stop_requested();
        self.stop();
    }

    /// 初期化・同期の失敗でセッションを中止する
    ///
    /// 停止処理が始まった後の失敗は停止による中断として扱います。
    pub(crate) fn abort_session(self: &Arc<Self>, message: &str, err: &DebugError) {
        if self.is_stopping() {
            debug!(connection = %self.connection_id(), error = %err, "{} (session stopping)", message);
            return;
        }
        self.status.set(StatusFlag::SynchronizeThrew, true);
        error!(connection = %self.connection_id(), error = %err, "{}", message);
        self.host
            .notify(NotificationLevel::Fatal, &format!("{}\n{}", message, err));
        self.request_stop();
    }

    pub(crate) fn initialize(self: &Arc<Self>) {
        if self.is_stopping() {
            debug!(connection = %self.connection_id(), "session stopped before initialization");
            return;
        }
        if let Err(e) = self.try_initialize() {
            self.abort_session(MSG_INITIALIZATION_FAILED, &e);
            return;
        }
        self.status.set_phase(SessionPhase::Attached);

        let session = Arc::clone(self);
        if let Err(e) = self.spawn_worker("sync", move || session.synchronize()) {
            self.abort_session(MSG_INITIALIZATION_FAILED, &e);
        }
    }

    fn try_initialize(&self) -> Result<(), DebugError> {
        self.console("Initializing debug environment...");

        let target = self.provider.target_connection(self.input.schema())?;
        self.adopt_connection(Arc::clone(&target), |c| &mut c.target)?;
        target.set_auto_commit(self.config.target_auto_commit)?;
        self.console("Target connection initialized");

        let debug = self.provider.debug_connection()?;
        self.adopt_connection(Arc::clone(&debug), |c| &mut c.debug)?;
        self.console("Debug connection initialized");

        let session_info = self.debugger.initialize_session(target.as_ref())?;
        self.debugger.enable_debugging(target.as_ref())?;
        self.console("Target session initialized");

        self.debugger.attach_session(&session_info.session_id, debug.as_ref())?;
        self.console("Debug session attached");
        Ok(())
    }

    pub(crate) fn synchronize(self: &Arc<Self>) {
        if self.status.is(StatusFlag::Terminating) || self.status.is(StatusFlag::TargetTerminated) {
            self.stop();
            return;
        }

        self.status.set(StatusFlag::BreakpointsEditable, true);
        self.register_breakpoints();
        if self.is_stopping() {
            debug!(connection = %self.connection_id(), "session stopped during breakpoint registration");
            return;
        }
        self.status.set_phase(SessionPhase::BreakpointsRegistered);

        // synchronize_session はターゲットが実行を始めるまで戻らない
        self.start_target();
        if self.status.is(StatusFlag::TargetThrew) || self.status.is(StatusFlag::TargetTerminated) {
            return;
        }

        match self.try_synchronize() {
            Ok(()) => self.resolve_suspend(),
            Err(e) => {
                let message = format!(
                    "Could not initialize debug environment on connection \"{}\"",
                    self.provider.name()
                );
                self.abort_session(&message, &e);
            }
        }
    }

    fn try_synchronize(&self) -> Result<(), DebugError> {
        let connection = self.debug_connection()?;
        let info = self
            .debugger
            .synchronize_session(connection.as_ref())
            .map_err(DebugError::Synchronization)?;
        debug!(position = %info, "debug session synchronized");
        self.runtime.replace(info);

        let info = self
            .debugger
            .step_over(connection.as_ref())
            .map_err(DebugError::Synchronization)?;
        self.runtime.replace(info);
        Ok(())
    }

    /// セッションを停止する
    ///
    /// 二回目以降の呼び出しは何もしません。
    pub(crate) fn stop(self: &Arc<Self>) {
        if !self.status.try_begin_termination() {
            return;
        }
        self.console("Stopping debugger...");
        self.input
            .set_cancelled(!self.status.is(StatusFlag::StoppedNormally));

        let session = Arc::clone(self);
        if let Err(e) = self.spawn_worker("stop", move || session.teardown()) {
            warn!(error = %e, "running teardown on the calling thread");
            self.teardown();
        }
    }

    fn teardown(&self) {
        self.best_effort("unregister breakpoints", || {
            self.unregister_breakpoints();
            Ok(())
        });
        self.status.set(StatusFlag::BreakpointsEditable, false);

        self.best_effort("roll out", || match self.roll_out() {
            Ok(steps) => {
                debug!(steps, "roll-out finished");
                Ok(())
            }
            Err(DebugError::TimeoutExceeded(budget)) => {
                debug!(?budget, "roll-out abandoned");
                Ok(())
            }
            Err(e) => Err(e),
        });

        let debug_connection = self.connections.lock().debug.clone();
        if let Some(connection) = debug_connection {
            if !self.status.is(StatusFlag::TargetTerminated) {
                self.best_effort("stop execution", || {
                    let info = self.debugger.stop_execution(connection.as_ref())?;
                    self.runtime.replace(info);
                    Ok(())
                });
            }
            self.best_effort("detach session", || {
                self.debugger.detach_session(connection.as_ref())?;
                self.console("Debugger session detached");
                Ok(())
            });
        }

        self.release_connections();
        self.await_target();
        self.registry.unregister_debug_session(self.connection_id());
        self.console("Debugger stopped");
        self.status.mark_terminated();
    }

    /// ターゲットのワーカーが結果を書き終えるまで待つ
    fn await_target(&self) {
        if !self.target_launched.load(Ordering::SeqCst) {
            return;
        }
        let budget = self.config.rollout_budget();
        if !self.status.wait_for(StatusFlag::TargetTerminated, budget) {
            warn!(connection = %self.connection_id(), ?budget, "target execution did not finish");
        }
    }

    /// ティアダウンの一手順を実行する
    ///
    /// 失敗しても（パニックしても）残りの手順は続行されます。
    fn best_effort<F>(&self, step: &'static str, f: F)
    where
        F: FnOnce() -> Result<(), DebugError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(connection = %self.connection_id(), step, error = %e, "teardown step failed");
                self.host
                    .notify(NotificationLevel::Warning, &format!("Error during {}: {}", step, e));
            }
            Err(_) => {
                warn!(connection = %self.connection_id(), step, "teardown step panicked");
            }
        }
    }
}
