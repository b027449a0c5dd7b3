//! デバッグセッションコントローラ
//!
//! ホスト（IDE や CLI）が操作するハンドルです。各操作はワーカースレッドで
//! 非同期に進み、結果は [`DebugHost`](crate::host::DebugHost) のコールバックで届きます。
//!
//! デバッグ接続は単一の書き手を前提としています。ホストは停止位置の報告を受けてから
//! 次の操作を発行してください。

use crate::breakpoint::BreakpointHandler;
use crate::errors::DebugError;
use crate::executor::DebugOperation;
use crate::session::{DebugSession, SessionContext};
use crate::status::{SessionPhase, StatusFlag, StatusRecord};
use crate::target::ExecutionInput;
use procdbg_protocol::{BacktraceInfo, ConnectionId, ProgramPosition, RuntimeInfo};
use std::sync::Arc;
use std::time::Duration;

/// デバッグセッションのハンドル
///
/// ドロップ時にセッションがまだ動いていれば停止します。
pub struct DebugController {
    session: Arc<DebugSession>,
}

impl DebugController {
    /// セッションを作成し、セッションレジストリに登録する
    pub fn new(input: ExecutionInput, context: SessionContext) -> Self {
        Self {
            session: DebugSession::new(input, context),
        }
    }

    /// セッション初期化（接続取得とアタッチ）を開始する
    ///
    /// 成功すると続けてブレークポイント登録・ターゲット実行・同期が行われます。
    pub fn session_initialized(&self) -> Result<(), DebugError> {
        if self.session.is_stopping() {
            return Err(DebugError::Terminated);
        }
        let session = Arc::clone(&self.session);
        self.session.spawn_worker("init", move || session.initialize())
    }

    pub fn start_step_over(&self) -> Result<(), DebugError> {
        self.session.start_operation(DebugOperation::StepOver)
    }

    pub fn start_step_into(&self) -> Result<(), DebugError> {
        self.session.start_operation(DebugOperation::StepInto)
    }

    pub fn start_step_out(&self) -> Result<(), DebugError> {
        self.session.start_operation(DebugOperation::StepOut)
    }

    pub fn resume(&self) -> Result<(), DebugError> {
        self.session.start_operation(DebugOperation::Resume)
    }

    pub fn run_to_position(&self, position: ProgramPosition) -> Result<(), DebugError> {
        self.session
            .start_operation(DebugOperation::RunToPosition(position))
    }

    pub fn start_pausing(&self) -> Result<(), DebugError> {
        self.session.start_operation(DebugOperation::Pause)
    }

    /// 任意の操作を開始する
    pub fn perform(&self, operation: DebugOperation) -> Result<(), DebugError> {
        self.session.start_operation(operation)
    }

    /// セッションを停止する（何度呼んでもよい）
    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn breakpoint_handler(&self) -> BreakpointHandler {
        BreakpointHandler::new(Arc::clone(&self.session))
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id()
    }

    pub fn execution_input(&self) -> &ExecutionInput {
        &self.session.input
    }

    pub fn status(&self) -> StatusRecord {
        self.session.status.snapshot()
    }

    pub fn is(&self, flag: StatusFlag) -> bool {
        self.session.status.is(flag)
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.status.phase()
    }

    /// 最後に報告された停止位置
    pub fn runtime_info(&self) -> Option<RuntimeInfo> {
        self.session.runtime.current()
    }

    /// 最後に取得したバックトレース
    pub fn backtrace(&self) -> Option<BacktraceInfo> {
        self.session.runtime.backtrace()
    }

    pub fn wait_for(&self, flag: StatusFlag, timeout: Duration) -> bool {
        self.session.status.wait_for(flag, timeout)
    }

    /// ティアダウンが完了するまで待つ
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        self.wait_for(StatusFlag::Terminated, timeout)
    }

    /// 起動済みのワーカーがすべて終わるまで待つ
    pub fn join_workers(&self) {
        self.session.join_workers();
    }
}

impl Drop for DebugController {
    fn drop(&mut self) {
        self.session.stop();
    }
}
