//! ランタイム状態キャッシュ
//!
//! 最後に報告された停止位置と、最後に取得したバックトレースを保持します。

use parking_lot::Mutex;
use procdbg_protocol::{BacktraceInfo, RuntimeInfo};

#[derive(Debug, Clone, Default)]
struct Cached {
    runtime: Option<RuntimeInfo>,
    backtrace: Option<BacktraceInfo>,
}

/// ランタイム状態キャッシュ
#[derive(Default)]
pub struct RuntimeState {
    inner: Mutex<Cached>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 停止位置を丸ごと置き換え、以前の値を返す
    pub fn replace(&self, info: RuntimeInfo) -> Option<RuntimeInfo> {
        self.inner.lock().runtime.replace(info)
    }

    pub fn current(&self) -> Option<RuntimeInfo> {
        self.inner.lock().runtime.clone()
    }

    pub fn set_backtrace(&self, backtrace: BacktraceInfo) {
        self.inner.lock().backtrace = Some(backtrace);
    }

    pub fn backtrace(&self) -> Option<BacktraceInfo> {
        self.inner.lock().backtrace.clone()
    }

    /// 停止位置が存在し、かつ終了を報告していないか
    pub fn is_suspended(&self) -> bool {
        self.inner
            .lock()
            .runtime
            .as_ref()
            .map_or(false, |info| !info.terminated)
    }
}
