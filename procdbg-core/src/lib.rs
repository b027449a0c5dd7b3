//! procdbg デバッガのコア機能
//!
//! データベースサーバー上で動くストアドプログラムのデバッグセッションを制御します。
//! セッションの初期化、ブレークポイント同期、ステップ・再開、停止状態の解決、
//! そして停止時のティアダウンとロールアウトを扱います。
//!
//! ベンダー固有のデバッグプロトコルは `procdbg-protocol` の
//! [`DebuggerInterface`](procdbg_protocol::DebuggerInterface) として抽象化されています。

pub mod breakpoint;
pub mod command;
pub mod config;
pub mod controller;
pub mod errors;
pub mod executor;
pub mod host;
pub mod parse;
pub mod registry;
pub mod runtime;
pub mod status;
pub mod target;

mod rollout;
mod runner;
mod session;

pub use breakpoint::{BreakpointHandler, BreakpointKey, BreakpointStore, LineBreakpoint};
pub use command::Command;
pub use config::SessionConfig;
pub use controller::DebugController;
pub use errors::DebugError;
pub use executor::DebugOperation;
pub use host::{
    BreakpointStatus, DebugHost, EntryPointResolver, NoEntryPoint, NotificationLevel,
    SourcePosition, SuspendContext,
};
pub use registry::SessionRegistry;
pub use session::SessionContext;
pub use status::{SessionPhase, StatusFlag, StatusFlags, StatusRecord};
pub use target::{Argument, DebugTarget, ExecutionInput, MethodTarget, StatementTarget};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
