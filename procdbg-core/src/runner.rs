//! デバッグ対象の実行
//!
//! ターゲット接続上での呼び出しは完了するまでブロックするため、専用のワーカーで動かします。

use crate::errors::DebugError;
use crate::host::NotificationLevel;
use crate::session::DebugSession;
use crate::status::{SessionPhase, StatusFlag};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error};

impl DebugSession {
    pub(crate) fn start_target(self: &Arc<Self>) {
        self.target_launched.store(true, Ordering::SeqCst);
        let session = Arc::clone(self);
        if let Err(e) = self.spawn_worker("target", move || session.run_target()) {
            error!(error = %e, "could not start target execution");
            self.status.set(StatusFlag::TargetThrew, true);
            self.status.set(StatusFlag::TargetTerminated, true);
            self.host.notify(NotificationLevel::Error, &e.to_string());
            self.request_stop();
        }
    }

    fn run_target(self: &Arc<Self>) {
        if self.status.is(StatusFlag::Terminating) || self.status.is(StatusFlag::SynchronizeThrew) {
            debug!("target execution skipped");
            self.status.set(StatusFlag::TargetTerminated, true);
            return;
        }

        let name = self.input.target().qualified_name();
        self.status.set(StatusFlag::TargetStarted, true);
        self.status.set_phase(SessionPhase::Running);
        self.console(&format!("Target program execution started: {}", name));

        match self.execute_target() {
            Ok(()) => {
                self.console("Target program execution ended");
                if !self.status.is(StatusFlag::Terminating) {
                    self.status.set(StatusFlag::StoppedNormally, true);
                }
            }
            Err(e) => {
                self.status.set(StatusFlag::TargetThrew, true);
                if self.input.is_cancelled() {
                    // 停止要求による中断
                    debug!(error = %e, "target execution cancelled");
                } else {
                    error!(error = %e, "target program execution failed");
                    self.host.notify(NotificationLevel::Error, &e.to_string());
                }
            }
        }

        self.status.set(StatusFlag::TargetTerminated, true);
        self.request_stop();
    }

    fn execute_target(&self) -> Result<(), DebugError> {
        let connection = self.target_connection()?;
        let statement = self.input.target().invocation();
        connection
            .execute(&statement)
            .map_err(|source| DebugError::TargetExecution {
                target: self.input.target().qualified_name(),
                source,
            })
    }
}
