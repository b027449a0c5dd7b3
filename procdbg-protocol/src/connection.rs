//! データベース接続の抽象化
//!
//! 接続プールの内部実装はこのクレートの範囲外です。
//! デバッグセッションが必要とする操作だけをトレイトとして定義します。

use crate::{DebuggerInterface, Result};
use std::fmt;
use std::sync::Arc;

/// 接続ハンドラ（論理的なデータベース接続設定）の識別子
///
/// セッションレジストリのキーとして使用されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// スキーマ識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaId(pub String);

impl SchemaId {
    pub fn new(name: &str) -> Self {
        Self(name.to_ascii_uppercase())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 物理的なデータベースセッション
///
/// ターゲット接続とデバッグ（制御）接続の両方がこのトレイトを実装します。
/// 各呼び出しはネットワーク往復の間、呼び出し元スレッドをブロックします。
pub trait DbConnection: Send + Sync {
    /// 物理接続の識別子
    fn id(&self) -> u64;

    /// 自動コミットを設定する
    fn set_auto_commit(&self, enabled: bool) -> Result<()>;

    /// 文を実行し、完了するまでブロックする
    fn execute(&self, statement: &str) -> Result<()>;

    /// 接続を閉じる（複数回呼んでもよい）
    fn close(&self);

    /// 接続が閉じられているかどうか
    fn is_closed(&self) -> bool;
}

/// デバッグセッションに接続を供給する接続ハンドラ
pub trait ConnectionProvider: Send + Sync {
    /// 接続ハンドラの識別子
    fn id(&self) -> ConnectionId;

    /// 表示用の接続名
    fn name(&self) -> String;

    /// この接続のベンダー固有デバッガインターフェース
    fn debugger(&self) -> Arc<dyn DebuggerInterface>;

    /// 指定スキーマにバインドされたターゲット接続を取得する
    fn target_connection(&self, schema: &SchemaId) -> Result<Arc<dyn DbConnection>>;

    /// プールからデバッグ制御用の接続を取得する
    fn debug_connection(&self) -> Result<Arc<dyn DbConnection>>;

    /// 接続を解放する
    fn release(&self, connection: Arc<dyn DbConnection>);
}
