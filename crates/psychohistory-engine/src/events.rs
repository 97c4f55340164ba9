use async_trait::async_trait;
use psychohistory_core::TreeStreamEvent;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("event sink closed")]
    Closed,
}

/// Receives scheduler events in emission order.
///
/// `emit` must be cheap: the channel-backed implementation enqueues into a
/// bounded buffer, so a slow consumer backpressures the scheduler rather
/// than dropping events. A closed sink is a scheduler-level fatal.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: TreeStreamEvent) -> Result<(), SinkError>;
}

/// Production sink: a bounded channel the HTTP endpoint drains into the
/// response stream. Dropping the receiver (client disconnect) closes it.
pub struct ChannelEventSink {
    tx: mpsc::Sender<TreeStreamEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<TreeStreamEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: TreeStreamEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = ChannelEventSink::new(tx);

        sink.emit(TreeStreamEvent::DepthCompleted {
            depth: 0,
            nodes_processed: 1,
        })
        .await
        .unwrap();
        sink.emit(TreeStreamEvent::TreeCompleted {
            total_nodes: 3,
            duration: 12,
        })
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "depth_completed");
        assert_eq!(rx.recv().await.unwrap().kind(), "tree_completed");
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = ChannelEventSink::new(tx);
        let result = sink
            .emit(TreeStreamEvent::DepthCompleted {
                depth: 0,
                nodes_processed: 0,
            })
            .await;
        assert!(matches!(result, Err(SinkError::Closed)));
    }
}
