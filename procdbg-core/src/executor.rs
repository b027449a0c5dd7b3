//! デバッグコマンドの実行と停止状態の解決

use crate::errors::DebugError;
use crate::host::{NotificationLevel, SourcePosition, SuspendContext};
use crate::session::DebugSession;
use crate::status::{SessionPhase, StatusFlag};
use procdbg_protocol::{BacktraceInfo, DbConnection, DebuggerInterface, ProgramPosition, RuntimeInfo};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一回のプロトコル往復で行うデバッグ操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOperation {
    StepOver,
    StepInto,
    StepOut,
    Resume,
    RunToPosition(ProgramPosition),
    /// synchronize による一時停止
    Pause,
}

impl DebugOperation {
    fn worker_name(&self) -> &'static str {
        match self {
            DebugOperation::StepOver => "step-over",
            DebugOperation::StepInto => "step-into",
            DebugOperation::StepOut => "step-out",
            DebugOperation::Resume => "resume",
            DebugOperation::RunToPosition(_) => "run-to-position",
            DebugOperation::Pause => "pause",
        }
    }

    fn issue(
        &self,
        debugger: &dyn DebuggerInterface,
        connection: &dyn DbConnection,
    ) -> procdbg_protocol::Result<RuntimeInfo> {
        match self {
            DebugOperation::StepOver => debugger.step_over(connection),
            DebugOperation::StepInto => debugger.step_into(connection),
            DebugOperation::StepOut => debugger.step_out(connection),
            DebugOperation::Resume => debugger.resume_execution(connection),
            DebugOperation::RunToPosition(pos) => debugger.run_to_position(
                &pos.schema,
                &pos.program,
                pos.object_type.as_str(),
                pos.line,
                connection,
            ),
            DebugOperation::Pause => debugger.synchronize_session(connection),
        }
    }
}

impl fmt::Display for DebugOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugOperation::StepOver => f.write_str("step over"),
            DebugOperation::StepInto => f.write_str("step into"),
            DebugOperation::StepOut => f.write_str("step out"),
            DebugOperation::Resume => f.write_str("resume"),
            DebugOperation::RunToPosition(pos) => write!(f, "run to {}", pos),
            DebugOperation::Pause => f.write_str("pause"),
        }
    }
}

impl DebugSession {
    /// 操作を専用のワーカーで開始する
    pub(crate) fn start_operation(self: &Arc<Self>, operation: DebugOperation) -> Result<(), DebugError> {
        if self.is_stopping() {
            return Err(DebugError::Terminated);
        }
        let session = Arc::clone(self);
        let name = operation.worker_name();
        self.spawn_worker(name, move || session.execute_operation(operation))
    }

    pub(crate) fn execute_operation(self: &Arc<Self>, operation: DebugOperation) {
        if self.is_stopping() {
            debug!(%operation, "session is stopping, operation skipped");
            return;
        }
        let connection = match self.debug_connection() {
            Ok(c) => c,
            Err(e) => {
                self.host
                    .notify(NotificationLevel::Error, &format!("Could not {}: {}", operation, e));
                return;
            }
        };

        self.status.set_phase(SessionPhase::Running);
        debug!(%operation, "issuing debug operation");
        match operation.issue(self.debugger.as_ref(), connection.as_ref()) {
            Ok(info) => {
                self.runtime.replace(info);
                self.resolve_suspend();
            }
            Err(e) => {
                warn!(%operation, error = %e, "debug operation failed");
                self.status.set_phase(SessionPhase::Suspended);
                self.host.notify(
                    NotificationLevel::Error,
                    &format!("Error performing operation: {}\n{}", operation, e),
                );
            }
        }
    }

    /// 直前の操作で得た停止状態を解決する
    ///
    /// 報告された位置がバックトレースの先頭と一致しない場合は先頭を取り込んで再開し直します。
    /// 取り込みの回数は `max_position_adoptions` で制限されます。
    pub(crate) fn resolve_suspend(self: &Arc<Self>) {
        let connection = match self.debug_connection() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "cannot resolve suspend state");
                return;
            }
        };

        let mut adoptions = 0;
        loop {
            if self.is_stopping() {
                self.request_stop();
                return;
            }
            let Some(current) = self.runtime.current() else {
                return;
            };
            if current.terminated {
                self.target_finished(&current);
                return;
            }

            let backtrace = match self.debugger.execution_backtrace(connection.as_ref()) {
                Ok(backtrace) => backtrace,
                Err(e) => {
                    warn!(error = %e, "backtrace not available");
                    self.host.notify(
                        NotificationLevel::Error,
                        &format!("Error suspending debugger session: {}", e),
                    );
                    self.report_position(current, None);
                    return;
                }
            };
            self.runtime.set_backtrace(backtrace.clone());

            let stale_top = backtrace
                .top()
                .filter(|top| !top.is_same_location(&current))
                .cloned();
            let Some(top) = stale_top else {
                self.report_position(current, Some(backtrace));
                return;
            };

            self.runtime.replace(top.clone());
            if adoptions >= self.config.max_position_adoptions {
                warn!(adoptions, position = %top, "position adoption limit reached");
                self.report_position(top, Some(backtrace));
                return;
            }
            adoptions += 1;
            debug!(reported = %current, actual = %top, "stale position reported, resuming");
            match self.debugger.resume_execution(connection.as_ref()) {
                Ok(info) => {
                    self.runtime.replace(info);
                }
                Err(e) => {
                    self.host.notify(
                        NotificationLevel::Error,
                        &format!("Error performing operation: resume\n{}", e),
                    );
                    self.report_position(top, Some(backtrace));
                    return;
                }
            }
        }
    }

    fn target_finished(self: &Arc<Self>, info: &RuntimeInfo) {
        let reason = self.debugger.runtime_event_reason(info.reason);
        self.console(&format!("Session terminated with code {} ({})", info.reason, reason));
        self.status.set(StatusFlag::StoppedNormally, true);
        self.request_stop();
    }

    fn report_position(&self, runtime: RuntimeInfo, backtrace: Option<BacktraceInfo>) {
        self.status.set_phase(SessionPhase::Suspended);
        let context = SuspendContext {
            position: SourcePosition::from_runtime(&runtime),
            backtrace,
            runtime,
        };
        info!(position = %context.runtime, reason = context.runtime.reason, "position reached");
        self.host.position_reached(&context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procdbg_protocol::ObjectType;

    #[test]
    fn test_operation_display() {
        assert_eq!(DebugOperation::StepOver.to_string(), "step over");
        let pos = ProgramPosition::new("HR", "PAY_RAISE", ObjectType::Procedure, 12);
        assert_eq!(
            DebugOperation::RunToPosition(pos).to_string(),
            "run to HR.PAY_RAISE:12"
        );
    }

    #[test]
    fn test_worker_names_are_distinct() {
        let ops = [
            DebugOperation::StepOver,
            DebugOperation::StepInto,
            DebugOperation::StepOut,
            DebugOperation::Resume,
            DebugOperation::Pause,
        ];
        let mut names: Vec<_> = ops.iter().map(|op| op.worker_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ops.len());
    }
}
