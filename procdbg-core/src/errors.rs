//! デバッグセッションのエラー型とメッセージ定数

use procdbg_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// デバッグ中の接続に対して禁止された操作を行おうとした場合のメッセージ
pub const MSG_FORBIDDEN_OPERATION: &str = "Operation not supported during active debug session.";

/// 初期化失敗時のメッセージ
pub const MSG_INITIALIZATION_FAILED: &str = "Error initializing debug environment";

/// デバッグセッションのエラー
#[derive(Error, Debug)]
pub enum DebugError {
    /// アダプタ呼び出しの失敗
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// デバッグ対象自体がエラーを投げた
    #[error("Error executing {target}: {source}")]
    TargetExecution {
        target: String,
        #[source]
        source: ProtocolError,
    },

    /// セッション同期の失敗
    #[error("Could not synchronize debug session: {0}")]
    Synchronization(#[source] ProtocolError),

    /// ロールアウトが予算内に終わらなかった
    #[error("Roll-out did not complete within {0:?}")]
    TimeoutExceeded(Duration),

    /// 接続がまだ（またはもう）存在しない
    #[error("{0} connection is not available")]
    NotConnected(&'static str),

    /// デバッグ中の接続に対する禁止操作
    #[error("{0}")]
    ForbiddenOperation(String),

    /// セッションは既に終了処理中または終了済み
    #[error("Debug session is terminated")]
    Terminated,

    /// ワーカースレッドを起動できなかった
    #[error("Failed to spawn debugger worker: {0}")]
    Worker(#[from] std::io::Error),
}
