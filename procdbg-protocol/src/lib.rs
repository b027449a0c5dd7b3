//! procdbg デバッグプロトコル境界
//!
//! このクレートは、データベースエンジン内蔵のデバッグ機能と通信するための
//! アダプタ境界を定義します。
//! ワイヤエンコーディング自体はベンダー固有の実装に任せ、ここでは
//! 接続、ランタイム情報、ブレークポイント情報、デバッガインターフェースの型だけを扱います。

pub mod breakpoint;
pub mod connection;
pub mod error;
pub mod interface;
pub mod mock;
pub mod runtime;

pub use breakpoint::{BreakpointId, BreakpointInfo, BreakpointOperationInfo, ObjectType, ProgramPosition};
pub use connection::{ConnectionId, ConnectionProvider, DbConnection, SchemaId};
pub use error::ProtocolError;
pub use interface::DebuggerInterface;
pub use runtime::{BacktraceInfo, RuntimeInfo, SessionInfo};

/// プロトコル操作の結果型
pub type Result<T> = std::result::Result<T, ProtocolError>;
