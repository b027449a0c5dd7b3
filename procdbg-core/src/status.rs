//! セッション状態フラグとライフサイクル
//!
//! フラグとフェーズは一つのミューテックスで保護されたレコードに格納され、
//! 変化のたびに条件変数で待機者に通知されます。

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// セッション状態フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    Terminating,
    Terminated,
    StoppedNormally,
    TargetStarted,
    TargetThrew,
    TargetTerminated,
    SynchronizeThrew,
    BreakpointsEditable,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 8] = [
        StatusFlag::Terminating,
        StatusFlag::Terminated,
        StatusFlag::StoppedNormally,
        StatusFlag::TargetStarted,
        StatusFlag::TargetThrew,
        StatusFlag::TargetTerminated,
        StatusFlag::SynchronizeThrew,
        StatusFlag::BreakpointsEditable,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFlag::Terminating => "terminating",
            StatusFlag::Terminated => "terminated",
            StatusFlag::StoppedNormally => "stopped-normally",
            StatusFlag::TargetStarted => "target-started",
            StatusFlag::TargetThrew => "target-threw",
            StatusFlag::TargetTerminated => "target-terminated",
            StatusFlag::SynchronizeThrew => "synchronize-threw",
            StatusFlag::BreakpointsEditable => "breakpoints-editable",
        }
    }
}

/// フラグの集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags(u16);

impl StatusFlags {
    pub fn contains(&self, flag: StatusFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    fn set(&mut self, flag: StatusFlag, value: bool) -> bool {
        let before = self.0;
        if value {
            self.0 |= flag.bit();
        } else {
            self.0 &= !flag.bit();
        }
        before != self.0
    }

    /// 立っているフラグを列挙する
    pub fn iter(&self) -> impl Iterator<Item = StatusFlag> + '_ {
        StatusFlag::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|flag| flag.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// セッションのライフサイクル
///
/// `Init → Attached → BreakpointsRegistered → Running ⇄ Suspended → Terminating → Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Attached,
    BreakpointsRegistered,
    Running,
    Suspended,
    Terminating,
    Terminated,
}

impl SessionPhase {
    fn is_final(&self) -> bool {
        matches!(self, SessionPhase::Terminating | SessionPhase::Terminated)
    }
}

/// 状態レコードのスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    pub flags: StatusFlags,
    pub phase: SessionPhase,
}

/// 共有される状態レコード
pub struct SessionStatus {
    record: Mutex<StatusRecord>,
    changed: Condvar,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(StatusRecord {
                flags: StatusFlags::default(),
                phase: SessionPhase::Init,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn is(&self, flag: StatusFlag) -> bool {
        self.record.lock().flags.contains(flag)
    }

    /// フラグを設定し、値が変わったかどうかを返す
    ///
    /// 終了済みのセッションには何も書き込みません。
    pub fn set(&self, flag: StatusFlag, value: bool) -> bool {
        let mut record = self.record.lock();
        if record.flags.contains(StatusFlag::Terminated) {
            return false;
        }
        let changed = record.flags.set(flag, value);
        drop(record);
        if changed {
            self.changed.notify_all();
        }
        changed
    }

    /// 終了処理の開始を試みる
    ///
    /// terminating / terminated のどちらも立っていなければ terminating を立てて
    /// `true` を返します。二回目以降の呼び出しは `false` です。
    pub fn try_begin_termination(&self) -> bool {
        let mut record = self.record.lock();
        if record.flags.contains(StatusFlag::Terminating)
            || record.flags.contains(StatusFlag::Terminated)
        {
            return false;
        }
        record.flags.set(StatusFlag::Terminating, true);
        record.phase = SessionPhase::Terminating;
        drop(record);
        self.changed.notify_all();
        true
    }

    /// 終了済みにする
    pub fn mark_terminated(&self) {
        let mut record = self.record.lock();
        record.flags.set(StatusFlag::Terminated, true);
        record.phase = SessionPhase::Terminated;
        drop(record);
        self.changed.notify_all();
    }

    pub fn phase(&self) -> SessionPhase {
        self.record.lock().phase
    }

    /// フェーズを進める
    ///
    /// 終了処理に入った後は無視されます。
    pub fn set_phase(&self, phase: SessionPhase) -> bool {
        let mut record = self.record.lock();
        if record.phase.is_final() || record.phase == phase {
            return false;
        }
        record.phase = phase;
        drop(record);
        self.changed.notify_all();
        true
    }

    pub fn snapshot(&self) -> StatusRecord {
        *self.record.lock()
    }

    /// フラグが立つまで待つ
    ///
    /// タイムアウトした場合は `false` を返します。
    pub fn wait_for(&self, flag: StatusFlag, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut record = self.record.lock();
        while !record.flags.contains(flag) {
            if self.changed.wait_until(&mut record, deadline).timed_out() {
                return record.flags.contains(flag);
            }
        }
        true
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}
