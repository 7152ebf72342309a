//! 진행/수명주기 알림
//!
//! 코어는 `Notifier`만 호출하고 구현에 의존하지 않는다.
//! 외부 셸은 `Event`를 `{ "event": "<name>", "payload": {...} }` 형태로 전달받는다.

use serde::Serialize;
use tokio::sync::mpsc;

/// 알림 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    SendingFileStart {
        file_name: String,
        current_file: usize,
        total_files: usize,
    },

    SendingFileProgress { sent: u32, total: u32 },

    ClientError { message: String },

    #[serde(rename_all = "camelCase")]
    ReceptionStarted { file_name: String },

    #[serde(rename_all = "camelCase")]
    ReceivingFileProgress {
        received: u32,
        total: u32,
        duplicate_count: u32,
    },

    ReceptionFinished { message: String },

    ServerError { message: String },
}

impl Event {
    /// 이벤트 이름 (셸 쪽 이벤트 채널 이름)
    pub fn name(&self) -> &'static str {
        match self {
            Event::SendingFileStart { .. } => "sending-file-start",
            Event::SendingFileProgress { .. } => "sending-file-progress",
            Event::ClientError { .. } => "client-error",
            Event::ReceptionStarted { .. } => "reception-started",
            Event::ReceivingFileProgress { .. } => "receiving-file-progress",
            Event::ReceptionFinished { .. } => "reception-finished",
            Event::ServerError { .. } => "server-error",
        }
    }

    fn is_error(&self) -> bool {
        matches!(self, Event::ClientError { .. } | Event::ServerError { .. })
    }

    fn is_progress(&self) -> bool {
        matches!(
            self,
            Event::SendingFileProgress { .. } | Event::ReceivingFileProgress { .. }
        )
    }
}

/// 이벤트 싱크
pub trait Notifier: Send + Sync {
    fn notify(&self, event: Event);
}

/// `tracing`으로 이벤트를 남기는 알림기
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: Event) {
        // 세그먼트 단위 진행률은 debug
        if event.is_error() {
            tracing::warn!(event = event.name(), "{:?}", event);
        } else if event.is_progress() {
            tracing::debug!(event = event.name(), "{:?}", event);
        } else {
            tracing::info!(event = event.name(), "{:?}", event);
        }
    }
}

/// 모든 이벤트를 버리는 알림기
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

/// 채널로 이벤트를 넘기는 알림기
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Event) {
        // 수신측이 사라졌으면 버림
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::SendingFileStart {
            file_name: "a.bin".into(),
            current_file: 1,
            total_files: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sending-file-start");
        assert_eq!(json["payload"]["fileName"], "a.bin");
        assert_eq!(json["payload"]["currentFile"], 1);
        assert_eq!(json["payload"]["totalFiles"], 2);

        let progress = Event::ReceivingFileProgress {
            received: 3,
            total: 4,
            duplicate_count: 1,
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["event"], progress.name());
        assert_eq!(json["payload"]["duplicateCount"], 1);
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Event::ServerError {
            message: "boom".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "server-error");
    }
}
