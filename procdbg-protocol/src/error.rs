//! プロトコルエラー

use thiserror::Error;

/// デバッグアダプタ呼び出しの失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// データベースが返したエラー
    #[error("database error{}: {message}", .code.map(|c| format!(" ORA-{:05}", c)).unwrap_or_default())]
    Database { code: Option<i32>, message: String },

    /// 接続が既に閉じられている
    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    /// アダプタがサポートしていない操作
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
}

impl ProtocolError {
    /// コードなしのデータベースエラーを作成する
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            code: None,
            message: message.into(),
        }
    }

    /// コード付きのデータベースエラーを作成する
    pub fn database_with_code(code: i32, message: impl Into<String>) -> Self {
        Self::Database {
            code: Some(code),
            message: message.into(),
        }
    }
}
