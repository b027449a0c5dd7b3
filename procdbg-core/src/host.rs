//! 埋め込み環境（IDE や CLI）との境界

use crate::breakpoint::LineBreakpoint;
use crate::target::MethodTarget;
use procdbg_protocol::{BacktraceInfo, BreakpointId, ProgramPosition, RuntimeInfo};
use std::fmt;

/// 通知の重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// セッションコンソールへの進捗
    Info,
    Warning,
    /// ステップ中などの非ブロッキングなエラー
    Error,
    /// 初期化失敗などのブロッキングなエラー
    Fatal,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
            NotificationLevel::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// ソース上の位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub owner: String,
    pub program: String,
    /// コンテンツパート（仕様部/本体部）
    pub namespace: u32,
    pub line: u32,
}

impl SourcePosition {
    /// 停止位置からソース位置を求める
    ///
    /// 無名ブロックなど所有者やプログラム名が無い場合は `None` です。
    pub fn from_runtime(info: &RuntimeInfo) -> Option<Self> {
        if info.terminated {
            return None;
        }
        Some(Self {
            owner: info.owner.clone()?,
            program: info.program.clone()?,
            namespace: info.namespace,
            line: info.line,
        })
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.program, self.line)
    }
}

/// 停止時にホストへ渡すコンテキスト
#[derive(Debug, Clone)]
pub struct SuspendContext {
    pub runtime: RuntimeInfo,
    pub backtrace: Option<BacktraceInfo>,
    pub position: Option<SourcePosition>,
}

/// ブレークポイントの登録状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointStatus {
    Verified(BreakpointId),
    Disabled(BreakpointId),
    /// サーバーから削除された
    Removed(BreakpointId),
    Invalid(String),
}

/// デバッグセッションをホストするフロントエンド
///
/// コールバックはワーカースレッドから呼ばれます。
pub trait DebugHost: Send + Sync {
    /// 停止位置に到達した
    fn position_reached(&self, context: &SuspendContext);

    /// セッションの停止を要求する
    fn stop_requested(&self);

    /// ユーザーに通知する
    fn notify(&self, level: NotificationLevel, message: &str);

    /// ブレークポイントの状態が変わった
    fn breakpoint_updated(&self, _breakpoint: &LineBreakpoint, _status: &BreakpointStatus) {}
}

/// デフォルトブレークポイントの位置を求める
pub trait EntryPointResolver: Send + Sync {
    fn resolve_entry(&self, target: &MethodTarget) -> Option<ProgramPosition>;
}

/// 入口を解決しないリゾルバ
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEntryPoint;

impl EntryPointResolver for NoEntryPoint {
    fn resolve_entry(&self, _target: &MethodTarget) -> Option<ProgramPosition> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_position_from_runtime() {
        let info = RuntimeInfo::at("HR", "PKG", 7).with_namespace(2);
        let pos = SourcePosition::from_runtime(&info).unwrap();
        assert_eq!(pos.namespace, 2);
        assert_eq!(pos.to_string(), "HR.PKG:7");

        assert!(SourcePosition::from_runtime(&RuntimeInfo::terminated(15)).is_none());
        let mut anonymous = RuntimeInfo::at("HR", "X", 1);
        anonymous.program = None;
        assert!(SourcePosition::from_runtime(&anonymous).is_none());
    }
}
