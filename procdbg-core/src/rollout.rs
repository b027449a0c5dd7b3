//! ロールアウト
//!
//! 停止時にデバッグ対象が中断したままにならないよう、終了が報告されるまで
//! ステップアウトを繰り返します。壁時計時間の予算を超えたら諦めます。

use crate::errors::DebugError;
use crate::session::DebugSession;
use crate::status::StatusFlag;
use std::time::Instant;
use tracing::trace;

impl DebugSession {
    /// 実行したステップアウトの回数を返す
    pub(crate) fn roll_out(&self) -> Result<usize, DebugError> {
        let budget = self.config.rollout_budget();
        let started = Instant::now();
        let mut steps = 0;

        while !self.status.is(StatusFlag::TargetThrew) && self.runtime.is_suspended() {
            let connection = self.debug_connection()?;
            let info = self.debugger.step_out(connection.as_ref())?;
            trace!(position = %info, "roll-out step");
            self.runtime.replace(info);
            steps += 1;

            if started.elapsed() > budget {
                return Err(DebugError::TimeoutExceeded(budget));
            }
        }
        Ok(steps)
    }
}
