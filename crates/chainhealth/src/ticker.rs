//! Cycle scheduling for the health monitor.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Source of "run a cycle now" signals.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next cycle. Returns `false` once no more cycles will come.
    ///
    /// Must be cancel safe: the monitor races it against its stop signal.
    async fn tick(&mut self) -> bool;
}

/// Fixed-period ticker. The first tick completes immediately.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Create a ticker firing every `period`
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        // A late tick is dropped rather than fired in a burst
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker driven by explicit triggers, for callers that schedule cycles
/// themselves.
pub struct ChannelTicker {
    rx: mpsc::Receiver<()>,
}

impl ChannelTicker {
    /// Create a ticker and the sender that triggers it.
    ///
    /// Dropping every sender ends the ticker.
    pub fn new(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
