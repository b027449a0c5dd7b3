//! セッションレジストリ
//!
//! デバッグ中の接続を追跡し、同じ接続上での競合する操作を禁止します。

use crate::errors::{DebugError, MSG_FORBIDDEN_OPERATION};
use parking_lot::Mutex;
use procdbg_protocol::ConnectionId;
use std::collections::HashMap;
use tracing::error;

/// デバッグ中の接続の集合
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<HashMap<ConnectionId, usize>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_debug_session(&self, connection: ConnectionId) {
        *self.active.lock().entry(connection).or_insert(0) += 1;
    }

    pub fn unregister_debug_session(&self, connection: ConnectionId) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&connection) {
            *count -= 1;
            if *count == 0 {
                active.remove(&connection);
            }
        }
    }

    pub fn is_debugging(&self, connection: ConnectionId) -> bool {
        self.active.lock().contains_key(&connection)
    }

    /// 接続がデバッグ中でないことを確認する
    pub fn ensure_not_debugging(
        &self,
        connection: ConnectionId,
        message: Option<&str>,
    ) -> Result<(), DebugError> {
        if self.is_debugging(connection) {
            let message = message.unwrap_or(MSG_FORBIDDEN_OPERATION);
            return Err(DebugError::ForbiddenOperation(message.to_string()));
        }
        Ok(())
    }

    /// 操作が許可されていれば `true`
    ///
    /// デバッグ中の接続に対してはエラーを記録して `false` を返します。
    pub fn check_forbidden_operation(&self, connection: ConnectionId) -> bool {
        self.check_forbidden_operation_with(connection, None)
    }

    pub fn check_forbidden_operation_with(
        &self,
        connection: ConnectionId,
        message: Option<&str>,
    ) -> bool {
        match self.ensure_not_debugging(connection, message) {
            Ok(()) => true,
            Err(e) => {
                error!(%connection, "{}", e);
                false
            }
        }
    }

    /// デバッグ中の接続一覧
    pub fn active_connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.active.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}
