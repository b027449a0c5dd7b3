//! ブレークポイント管理
//!
//! クライアント側で宣言された行ブレークポイントと、サーバーが割り当てたIDとの
//! 対応を管理します。登録は「スナップショット取得」と「サーバーへの送信」の
//! 二段階で行います。

use crate::host::{BreakpointStatus, NotificationLevel};
use crate::session::DebugSession;
use crate::status::StatusFlag;
use parking_lot::{Mutex, MutexGuard, RwLock};
use procdbg_protocol::{BreakpointId, BreakpointInfo, ConnectionId, DbConnection, ProgramPosition};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// 宣言されたブレークポイントの識別キー (file, line)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointKey {
    pub file: String,
    pub line: u32,
}

/// クライアントが宣言した行ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineBreakpoint {
    /// エディタ上のファイル
    pub file: String,
    /// エディタ上の行
    pub line: u32,
    /// ブレークポイントが属する接続
    pub connection: ConnectionId,
    /// サーバーに送るプログラム位置
    pub position: ProgramPosition,
    pub enabled: bool,
}

impl LineBreakpoint {
    pub fn new(file: &str, connection: ConnectionId, position: ProgramPosition) -> Self {
        Self {
            file: file.to_string(),
            line: position.line,
            connection,
            position,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn key(&self) -> BreakpointKey {
        BreakpointKey {
            file: self.file.clone(),
            line: self.line,
        }
    }
}

/// 宣言されたブレークポイントの一覧
///
/// ホストのブレークポイントUIに相当します。複数のセッションから共有されます。
#[derive(Debug, Default)]
pub struct BreakpointStore {
    declared: RwLock<Vec<LineBreakpoint>>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ブレークポイントを追加する（同じキーのものは置き換える）
    pub fn add(&self, breakpoint: LineBreakpoint) {
        let mut declared = self.declared.write();
        let key = breakpoint.key();
        match declared.iter_mut().find(|bp| bp.key() == key) {
            Some(existing) => *existing = breakpoint,
            None => declared.push(breakpoint),
        }
    }

    pub fn remove(&self, key: &BreakpointKey) -> Option<LineBreakpoint> {
        let mut declared = self.declared.write();
        let index = declared.iter().position(|bp| &bp.key() == key)?;
        Some(declared.remove(index))
    }

    pub fn set_enabled(&self, key: &BreakpointKey, enabled: bool) -> Option<LineBreakpoint> {
        let mut declared = self.declared.write();
        let bp = declared.iter_mut().find(|bp| &bp.key() == key)?;
        bp.enabled = enabled;
        Some(bp.clone())
    }

    pub fn get(&self, key: &BreakpointKey) -> Option<LineBreakpoint> {
        self.declared.read().iter().find(|bp| &bp.key() == key).cloned()
    }

    /// 指定接続に属するブレークポイントの一貫したスナップショット
    pub fn snapshot_for(&self, connection: ConnectionId) -> Vec<LineBreakpoint> {
        self.declared
            .read()
            .iter()
            .filter(|bp| bp.connection == connection)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<LineBreakpoint> {
        self.declared.read().clone()
    }

    pub fn len(&self) -> usize {
        self.declared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.read().is_empty()
    }
}

#[derive(Debug, Default)]
struct Tags {
    ids: HashMap<BreakpointKey, BreakpointId>,
    default: Option<(BreakpointId, ProgramPosition)>,
}

/// セッションごとの「宣言 → サーバーID」タグ
///
/// サーバーへの登録とタグ付けは `gate` を保持したまま行います。
/// ティアダウンが `close` した後は新しい登録を受け付けません。
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    tags: Mutex<Tags>,
    gate: Mutex<bool>,
}

/// 登録中に保持するガード
pub(crate) struct RegistrationGuard<'a> {
    _gate: MutexGuard<'a, bool>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録を開始する。閉じられていれば `None`
    pub(crate) fn begin_registration(&self) -> Option<RegistrationGuard<'_>> {
        let gate = self.gate.lock();
        if *gate {
            return None;
        }
        Some(RegistrationGuard { _gate: gate })
    }

    /// 以後の登録を拒否し、すべてのタグを取り出す
    ///
    /// 進行中の登録が終わるまで待ちます。
    fn close(&self) -> (Vec<BreakpointId>, Option<BreakpointId>) {
        let mut gate = self.gate.lock();
        *gate = true;
        let drained = self.drain();
        drop(gate);
        drained
    }

    pub fn is_closed(&self) -> bool {
        *self.gate.lock()
    }

    pub fn id_of(&self, key: &BreakpointKey) -> Option<BreakpointId> {
        self.tags.lock().ids.get(key).copied()
    }

    pub fn tag(&self, key: BreakpointKey, id: BreakpointId) {
        self.tags.lock().ids.insert(key, id);
    }

    pub fn untag(&self, key: &BreakpointKey) -> Option<BreakpointId> {
        self.tags.lock().ids.remove(key)
    }

    /// デフォルトブレークポイントを記録する（セッションにつき一つ）
    pub fn set_default(&self, id: BreakpointId, position: ProgramPosition) -> bool {
        let mut tags = self.tags.lock();
        if tags.default.is_some() {
            return false;
        }
        tags.default = Some((id, position));
        true
    }

    pub fn default_breakpoint(&self) -> Option<(BreakpointId, ProgramPosition)> {
        self.tags.lock().default.clone()
    }

    pub fn tagged_count(&self) -> usize {
        self.tags.lock().ids.len()
    }

    /// すべてのタグを取り出す
    ///
    /// 戻り値は（宣言ブレークポイントのID一覧, デフォルトブレークポイントのID）です。
    fn drain(&self) -> (Vec<BreakpointId>, Option<BreakpointId>) {
        let mut tags = self.tags.lock();
        let mut ids: Vec<_> = tags.ids.drain().map(|(_, id)| id).collect();
        ids.sort_unstable();
        let default = tags.default.take().map(|(id, _)| id);
        (ids, default)
    }
}

impl DebugSession {
    /// 宣言済みのブレークポイントをすべてサーバーに登録する
    ///
    /// 一つの登録失敗は他のブレークポイントに影響しません。
    pub(crate) fn register_breakpoints(&self) {
        self.console("Registering breakpoints...");
        let declared = self.store.snapshot_for(self.connection_id());

        let connection = match self.debug_connection() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "breakpoints not registered");
                return;
            }
        };
        for breakpoint in &declared {
            if self.register_breakpoint(breakpoint, connection.as_ref()).is_none() {
                debug!("breakpoint registration closed by teardown");
                return;
            }
        }
        self.register_default_breakpoint(connection.as_ref());
        self.console("Done registering breakpoints");
    }

    /// ブレークポイントを一つ登録する
    ///
    /// ティアダウンが登録を閉じた後は何もせず `None` を返します。
    pub(crate) fn register_breakpoint(
        &self,
        breakpoint: &LineBreakpoint,
        connection: &dyn DbConnection,
    ) -> Option<BreakpointStatus> {
        let _registration = self.breakpoints.begin_registration()?;
        let status = match self.breakpoints.id_of(&breakpoint.key()) {
            Some(id) => self.toggle_breakpoint(id, breakpoint.enabled, connection),
            None => self.add_breakpoint(breakpoint, connection),
        };
        match &status {
            BreakpointStatus::Invalid(reason) => {
                warn!(breakpoint = %breakpoint.position, %reason, "breakpoint rejected")
            }
            _ => debug!(breakpoint = %breakpoint.position, ?status, "breakpoint registered"),
        }
        self.host.breakpoint_updated(breakpoint, &status);
        Some(status)
    }

    fn add_breakpoint(&self, breakpoint: &LineBreakpoint, connection: &dyn DbConnection) -> BreakpointStatus {
        let position = &breakpoint.position;
        let info = match self.debugger.add_program_breakpoint(
            &position.schema,
            &position.program,
            position.object_type.as_str(),
            position.line,
            connection,
        ) {
            Ok(info) => info,
            Err(e) => return BreakpointStatus::Invalid(e.to_string()),
        };
        match info {
            BreakpointInfo { error: Some(error), .. } => BreakpointStatus::Invalid(error),
            BreakpointInfo { breakpoint_id: None, .. } => {
                BreakpointStatus::Invalid("server returned no breakpoint id".to_string())
            }
            BreakpointInfo { breakpoint_id: Some(id), .. } => {
                self.breakpoints.tag(breakpoint.key(), id);
                if breakpoint.enabled {
                    BreakpointStatus::Verified(id)
                } else {
                    self.toggle_breakpoint(id, false, connection)
                }
            }
        }
    }

    fn toggle_breakpoint(&self, id: BreakpointId, enabled: bool, connection: &dyn DbConnection) -> BreakpointStatus {
        let result = if enabled {
            self.debugger.enable_breakpoint(id, connection)
        } else {
            self.debugger.disable_breakpoint(id, connection)
        };
        match result {
            Ok(op) => match op.error {
                Some(error) => BreakpointStatus::Invalid(error),
                None if enabled => BreakpointStatus::Verified(id),
                None => BreakpointStatus::Disabled(id),
            },
            Err(e) => BreakpointStatus::Invalid(e.to_string()),
        }
    }

    fn register_default_breakpoint(&self, connection: &dyn DbConnection) {
        let Some(_registration) = self.breakpoints.begin_registration() else {
            return;
        };
        if self.breakpoints.default_breakpoint().is_some() {
            return;
        }
        let Some(position) = self
            .input
            .target()
            .default_breakpoint(self.entry_resolver.as_ref())
        else {
            return;
        };

        match self.debugger.add_program_breakpoint(
            &position.schema,
            &position.program,
            position.object_type.as_str(),
            position.line,
            connection,
        ) {
            Ok(BreakpointInfo { breakpoint_id: Some(id), error: None }) => {
                debug!(%position, id, "default breakpoint registered");
                self.breakpoints.set_default(id, position);
            }
            Ok(info) => warn!(%position, error = ?info.error, "default breakpoint rejected"),
            Err(e) => warn!(%position, error = %e, "default breakpoint not registered"),
        }
    }

    /// タグ付けされたブレークポイントをすべて削除する
    ///
    /// 同じサーバーIDは一度だけ削除します。
    pub(crate) fn unregister_breakpoints(&self) {
        let (ids, default) = self.breakpoints.close();
        let connection = match self.debug_connection() {
            Ok(c) => c,
            Err(_) => return,
        };

        let mut removed = HashSet::new();
        for id in ids.into_iter().chain(default) {
            if !removed.insert(id) {
                continue;
            }
            match self.debugger.remove_breakpoint(id, connection.as_ref()) {
                Ok(op) => {
                    if let Some(error) = op.error {
                        warn!(id, %error, "breakpoint removal rejected");
                    }
                }
                Err(e) => warn!(id, error = %e, "breakpoint removal failed"),
            }
        }
    }
}

/// ホストのブレークポイントUIからの編集を受け付けるハンドラ
///
/// ブレークポイントが編集可能な間だけサーバーに反映されます。
pub struct BreakpointHandler {
    session: Arc<DebugSession>,
}

impl BreakpointHandler {
    pub(crate) fn new(session: Arc<DebugSession>) -> Self {
        Self { session }
    }

    /// 編集がサーバーに反映される状態かどうか
    pub fn is_editable(&self) -> bool {
        self.session.status.is(StatusFlag::BreakpointsEditable)
            && !self.session.is_stopping()
    }

    fn accepts(&self, breakpoint: &LineBreakpoint) -> bool {
        self.is_editable() && breakpoint.connection == self.session.connection_id()
    }

    /// ブレークポイントを一つ登録する
    ///
    /// 編集できない場合や別の接続のブレークポイントの場合は `None` です。
    pub fn register_breakpoint(&self, breakpoint: &LineBreakpoint) -> Option<BreakpointStatus> {
        if !self.accepts(breakpoint) {
            return None;
        }
        let connection = self.session.debug_connection().ok()?;
        self.session.register_breakpoint(breakpoint, connection.as_ref())
    }

    /// ブレークポイントを一つ解除する
    ///
    /// `temporary` の場合はサーバー側で無効化するだけで、IDは保持します。
    pub fn unregister_breakpoint(&self, breakpoint: &LineBreakpoint, temporary: bool) -> bool {
        if !self.accepts(breakpoint) {
            return false;
        }
        let session = &self.session;
        let Some(_registration) = session.breakpoints.begin_registration() else {
            return false;
        };
        let Some(id) = session.breakpoints.id_of(&breakpoint.key()) else {
            return false;
        };
        let Ok(connection) = session.debug_connection() else {
            return false;
        };

        let result = if temporary {
            session.debugger.disable_breakpoint(id, connection.as_ref())
        } else {
            session.debugger.remove_breakpoint(id, connection.as_ref())
        };
        match result {
            Ok(op) => match op.error {
                Some(error) => {
                    warn!(id, %error, "breakpoint update rejected");
                    session
                        .host
                        .breakpoint_updated(breakpoint, &BreakpointStatus::Invalid(error));
                    false
                }
                None => {
                    let status = if temporary {
                        BreakpointStatus::Disabled(id)
                    } else {
                        session.breakpoints.untag(&breakpoint.key());
                        BreakpointStatus::Removed(id)
                    };
                    session.host.breakpoint_updated(breakpoint, &status);
                    true
                }
            },
            Err(e) => {
                session.host.notify(
                    NotificationLevel::Warning,
                    &format!("Error updating breakpoint {}: {}", breakpoint.position, e),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procdbg_protocol::ObjectType;

    fn bp(file: &str, line: u32, conn: u64) -> LineBreakpoint {
        LineBreakpoint::new(
            file,
            ConnectionId(conn),
            ProgramPosition::new("HR", "PAY_RAISE", ObjectType::Procedure, line),
        )
    }

    #[test]
    fn test_store_replaces_same_key() {
        let store = BreakpointStore::new();
        store.add(bp("pay_raise.prc", 10, 1));
        store.add(bp("pay_raise.prc", 10, 1).disabled());
        assert_eq!(store.len(), 1);
        assert!(!store.all()[0].enabled);
    }

    #[test]
    fn test_snapshot_filters_by_connection() {
        let store = BreakpointStore::new();
        store.add(bp("pay_raise.prc", 10, 1));
        store.add(bp("pay_raise.prc", 11, 2));
        store.add(bp("pay_raise.prc", 12, 1));

        let lines: Vec<u32> = store
            .snapshot_for(ConnectionId(1))
            .iter()
            .map(|bp| bp.line)
            .collect();
        assert_eq!(lines, vec![10, 12]);
    }

    #[test]
    fn test_store_remove_and_toggle() {
        let store = BreakpointStore::new();
        let key = bp("pay_raise.prc", 10, 1).key();
        store.add(bp("pay_raise.prc", 10, 1));

        assert_eq!(store.set_enabled(&key, false).map(|bp| bp.enabled), Some(false));
        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_registry_default_is_set_once() {
        let registry = BreakpointRegistry::new();
        let pos = ProgramPosition::new("HR", "PAY_RAISE", ObjectType::Procedure, 3);
        assert!(registry.set_default(5, pos.clone()));
        assert!(!registry.set_default(6, pos));
        assert_eq!(registry.default_breakpoint().map(|(id, _)| id), Some(5));
    }

    #[test]
    fn test_registry_drain() {
        let registry = BreakpointRegistry::new();
        registry.tag(bp("a.prc", 10, 1).key(), 2);
        registry.tag(bp("b.prc", 10, 1).key(), 1);
        registry.set_default(7, ProgramPosition::new("HR", "P", ObjectType::Procedure, 1));

        let (ids, default) = registry.drain();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(default, Some(7));
        assert_eq!(registry.tagged_count(), 0);
        assert!(registry.default_breakpoint().is_none());
    }

    #[test]
    fn test_registry_close_rejects_registration() {
        let registry = BreakpointRegistry::new();
        {
            let _registration = registry.begin_registration().expect("open");
            registry.tag(bp("a.prc", 10, 1).key(), 1);
        }

        let (ids, _) = registry.close();
        assert_eq!(ids, vec![1]);
        assert!(registry.is_closed());
        assert!(registry.begin_registration().is_none());
    }

    #[test]
    fn test_registry_close_waits_for_registration() {
        let registry = Arc::new(BreakpointRegistry::new());
        let registration = registry.begin_registration().expect("open");

        let closer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.close())
        };
        // 登録中のタグは close に取り出される
        std::thread::sleep(std::time::Duration::from_millis(50));
        registry.tag(bp("a.prc", 12, 1).key(), 4);
        drop(registration);

        let (ids, _) = closer.join().unwrap();
        assert_eq!(ids, vec![4]);
        assert_eq!(registry.tagged_count(), 0);
    }
}
