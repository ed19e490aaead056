//! Lifecycle status and its broadcast stream

use async_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of status changes buffered for consumers
pub const STATUS_CAPACITY: usize = 5;

/// Lifecycle status of the supervised process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing has been launched yet
    #[default]
    Unknown,
    /// A launch is in progress
    Starting,
    /// The process is running
    Running,
    /// The process is being replaced by a fresh instance
    Restarting,
    /// The process has been asked to stop
    Stopping,
    /// The process is gone and will not come back
    Stopped,
}

impl Status {
    /// Whether this is the terminal state
    pub fn is_terminal(self) -> bool {
        self == Status::Stopped
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unknown => "unknown",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Restarting => "restarting",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Publishing side of the status stream.
///
/// Publishing never waits: when the buffer is full the oldest pending
/// status is discarded to make room, so a slow consumer may miss
/// intermediate states but always sees the latest one.
#[derive(Debug)]
pub(crate) struct StatusBroadcast {
    tx: Sender<Status>,
    /// Kept to evict the oldest entry when the buffer is full
    evict: Receiver<Status>,
}

impl StatusBroadcast {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, evict) = async_channel::bounded(capacity);
        Self { tx, evict }
    }

    /// A receiver for consumers
    pub(crate) fn subscribe(&self) -> Receiver<Status> {
        self.evict.clone()
    }

    pub(crate) fn publish(&self, status: Status) {
        let mut pending = status;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(status)) => {
                    let _ = self.evict.try_recv();
                    pending = status;
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }

    /// Close the stream; consumers drain what is buffered and then end
    pub(crate) fn close(&self) {
        self.tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Status::Running.to_string(), "running");
        assert_eq!(Status::Unknown.to_string(), "unknown");
        assert!(Status::Stopped.is_terminal());
        assert!(!Status::Stopping.is_terminal());
    }

    #[test]
    fn test_publish_drops_oldest_when_full() {
        let broadcast = StatusBroadcast::new(2);
        let rx = broadcast.subscribe();

        broadcast.publish(Status::Starting);
        broadcast.publish(Status::Running);
        broadcast.publish(Status::Restarting);
        broadcast.publish(Status::Running);

        assert_eq!(rx.try_recv(), Ok(Status::Restarting));
        assert_eq!(rx.try_recv(), Ok(Status::Running));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_ends_stream_after_drain() {
        let broadcast = StatusBroadcast::new(STATUS_CAPACITY);
        let rx = broadcast.subscribe();

        broadcast.publish(Status::Stopped);
        broadcast.close();
        broadcast.publish(Status::Running);

        futures::executor::block_on(async {
            assert_eq!(rx.recv().await, Ok(Status::Stopped));
            assert!(rx.recv().await.is_err());
        });
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Stopping).unwrap(), "\"stopping\"");
    }
}
