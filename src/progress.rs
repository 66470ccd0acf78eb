// THEORY:
// A scan takes long enough that a caller wants to know what it is doing. The
// orchestrator announces each milestone to a `ProgressSink` it was handed at
// construction. Delivery is fire-and-forget: a sink that drops an event, or has
// nobody listening, never affects the scan.

use std::sync::Arc;

use log::info;
use serde::Serialize;
use tokio::sync::mpsc;

/// Milestones a scan reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    FetchingStarted { tiles: usize },
    ScanningStarted,
    ScanComplete { count: usize },
    ScanError { message: String },
}

pub trait ProgressSink {
    fn notify(&self, event: ProgressEvent);
}

impl<T: ProgressSink + ?Sized> ProgressSink for &T {
    fn notify(&self, event: ProgressEvent) {
        (**self).notify(event)
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn notify(&self, event: ProgressEvent) {
        (**self).notify(event)
    }
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn notify(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::FetchingStarted { tiles } => info!("fetching {} tiles", tiles),
            ProgressEvent::ScanningStarted => info!("scanning region"),
            ProgressEvent::ScanComplete { count } => info!("scan complete: {} court(s)", count),
            ProgressEvent::ScanError { message } => info!("scan error: {}", message),
        }
    }
}

/// Forwards events to a channel, for a transport layer to relay.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn notify(&self, event: ProgressEvent) {
        // Nobody listening is fine.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kebab_case_names() {
        let json = serde_json::to_string(&ProgressEvent::FetchingStarted { tiles: 4 }).unwrap();
        assert_eq!(json, r#"{"event":"fetching-started","tiles":4}"#);

        let json = serde_json::to_string(&ProgressEvent::ScanningStarted).unwrap();
        assert_eq!(json, r#"{"event":"scanning-started"}"#);

        let json = serde_json::to_string(&ProgressEvent::ScanComplete { count: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"scan-complete","count":2}"#);
    }

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelProgressSink::channel();
        sink.notify(ProgressEvent::ScanningStarted);
        sink.notify(ProgressEvent::ScanComplete { count: 0 });

        assert_eq!(rx.recv().await, Some(ProgressEvent::ScanningStarted));
        assert_eq!(rx.recv().await, Some(ProgressEvent::ScanComplete { count: 0 }));
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sink, rx) = ChannelProgressSink::channel();
        drop(rx);
        sink.notify(ProgressEvent::ScanError { message: "boom".into() });
    }
}
