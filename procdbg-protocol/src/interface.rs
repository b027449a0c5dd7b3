//! ベンダー固有デバッガインターフェース

use crate::{
    BacktraceInfo, BreakpointId, BreakpointInfo, BreakpointOperationInfo, DbConnection, Result,
    RuntimeInfo, SessionInfo,
};

/// デバッグプロトコルアダプタ
///
/// ターゲット接続で動くデバッグ対象を、別のデバッグ接続から制御します。
/// 実装は複数のワーカースレッドから共有されるため `Send + Sync` が必要です。
pub trait DebuggerInterface: Send + Sync {
    /// ターゲット接続でデバッグセッションを初期化する
    fn initialize_session(&self, target: &dyn DbConnection) -> Result<SessionInfo>;

    /// ターゲットセッションでデバッグを有効化する
    fn enable_debugging(&self, target: &dyn DbConnection) -> Result<()>;

    /// ターゲットセッションでデバッグを無効化する
    fn disable_debugging(&self, target: &dyn DbConnection) -> Result<()>;

    /// デバッグ接続をターゲットセッションにアタッチする
    fn attach_session(&self, session_id: &str, debug: &dyn DbConnection) -> Result<()>;

    /// デバッグ接続をデタッチする
    fn detach_session(&self, debug: &dyn DbConnection) -> Result<()>;

    /// ターゲットが停止するまで待ち、その位置を返す
    fn synchronize_session(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// プログラムにブレークポイントを追加する
    fn add_program_breakpoint(
        &self,
        schema: &str,
        program: &str,
        object_type: &str,
        line: u32,
        debug: &dyn DbConnection,
    ) -> Result<BreakpointInfo>;

    /// ブレークポイントを削除する
    fn remove_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo>;

    /// ブレークポイントを有効化する
    fn enable_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo>;

    /// ブレークポイントを無効化する
    fn disable_breakpoint(&self, id: BreakpointId, debug: &dyn DbConnection) -> Result<BreakpointOperationInfo>;

    /// 次の行へ（呼び出しには入らない）
    fn step_over(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// 次の行へ（呼び出しに入る）
    fn step_into(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// 現在のプログラムから抜けるまで実行
    fn step_out(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// 指定位置まで実行
    fn run_to_position(
        &self,
        schema: &str,
        program: &str,
        object_type: &str,
        line: u32,
        debug: &dyn DbConnection,
    ) -> Result<RuntimeInfo>;

    /// 次のブレークポイントまで実行継続
    fn resume_execution(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// デバッグ対象の実行を中止する
    fn stop_execution(&self, debug: &dyn DbConnection) -> Result<RuntimeInfo>;

    /// 現在のコールスタックを取得する
    fn execution_backtrace(&self, debug: &dyn DbConnection) -> Result<BacktraceInfo>;

    /// 理由コードを説明文に変換する
    fn runtime_event_reason(&self, code: i32) -> String;
}
