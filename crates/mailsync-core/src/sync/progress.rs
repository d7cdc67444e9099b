//! Progress observers for sync passes.
//!
//! Reporting is fire-and-forget: a sink must not block the pass or fail it.

use tokio::sync::mpsc;
use tracing::{debug, info};

/// One progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Messages handled so far.
    pub current: usize,
    /// Messages selected for the pass.
    pub total: usize,
    /// Human-readable status line.
    pub status: String,
}

impl Progress {
    /// Creates an update.
    #[must_use]
    pub fn new(current: usize, total: usize, status: impl Into<String>) -> Self {
        Self {
            current,
            total,
            status: status.into(),
        }
    }
}

/// Receives progress updates.
pub trait ProgressSink: Send + Sync {
    /// Accepts one update. Must return promptly.
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress);
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

/// Writes updates to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: Progress) {
        info!(
            current = progress.current,
            total = progress.total,
            "{}",
            progress.status
        );
    }
}

/// Forwards updates into a bounded channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<Progress>,
}

impl ChannelProgress {
    /// Wraps the sending half of a channel.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<Progress>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, progress: Progress) {
        if let Err(e) = self.tx.try_send(progress) {
            debug!("Progress update dropped: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p.current);
        sink.report(Progress::new(1, 2, "one"));
        sink.report(Progress::new(2, 2, "two"));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_channel_sink_never_blocks() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = ChannelProgress::new(tx);
        sink.report(Progress::new(1, 3, "first"));
        sink.report(Progress::new(2, 3, "dropped"));
        assert_eq!(rx.recv().await.unwrap().status, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        ChannelProgress::new(tx).report(Progress::new(0, 0, "nobody listening"));
    }
}
