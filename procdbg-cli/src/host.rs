//! REPL 向けのデバッグホスト
//!
//! ワーカースレッドからのコールバックをチャネルに流し、REPL 側で表示します。

use crossbeam_channel::{Receiver, Sender};
use procdbg_core::{BreakpointStatus, DebugHost, LineBreakpoint, NotificationLevel, SuspendContext};

/// ワーカーから届くイベント
#[derive(Debug)]
pub enum HostEvent {
    Suspended(SuspendContext),
    StopRequested,
    Notification(NotificationLevel, String),
    BreakpointUpdated(LineBreakpoint, BreakpointStatus),
}

pub struct ChannelHost {
    sender: Sender<HostEvent>,
}

impl ChannelHost {
    pub fn new() -> (Self, Receiver<HostEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: HostEvent) {
        // REPL が終了した後のイベントは捨てる
        let _ = self.sender.send(event);
    }
}

impl DebugHost for ChannelHost {
    fn position_reached(&self, context: &SuspendContext) {
        self.send(HostEvent::Suspended(context.clone()));
    }

    fn stop_requested(&self) {
        self.send(HostEvent::StopRequested);
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.send(HostEvent::Notification(level, message.to_string()));
    }

    fn breakpoint_updated(&self, breakpoint: &LineBreakpoint, status: &BreakpointStatus) {
        self.send(HostEvent::BreakpointUpdated(breakpoint.clone(), status.clone()));
    }
}
