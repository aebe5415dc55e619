use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Consecutive unacknowledged heartbeats before the connection is considered
/// half-open and torn down for a resume.
pub const MAX_MISSED_ACKS: u32 = 2;

/// Repeating heartbeat timer, armed by the HELLO frame and driven from the
/// session event loop. While unarmed, [`tick`](Self::tick) pends forever, so
/// no heartbeat can fire before an interval has been established.
#[derive(Debug, Default)]
pub struct HeartbeatScheduler {
    timer: Option<Interval>,
    awaiting_ack: bool,
    missed: u32,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer. An already-running timer is replaced, never duplicated.
    /// The first tick fires one full interval from now.
    pub fn start(&mut self, interval: Duration) {
        let mut timer = interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        self.awaiting_ack = false;
        self.missed = 0;
    }

    /// Cancel the timer. Calling this while not running is a no-op.
    pub fn stop(&mut self) {
        self.timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Wait for the next heartbeat tick. Pends forever while stopped.
    /// Cancel-safe: dropping the future loses no tick.
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Record that a heartbeat is about to be sent; returns how many earlier
    /// beats in a row went unacknowledged.
    pub fn note_sent(&mut self) -> u32 {
        if self.awaiting_ack {
            self.missed += 1;
        }
        self.awaiting_ack = true;
        self.missed
    }

    /// Record a heartbeat acknowledgement from the gateway.
    pub fn record_ack(&mut self) {
        self.awaiting_ack = false;
        self.missed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_pends_while_stopped() {
        let mut scheduler = HeartbeatScheduler::new();
        assert!(!scheduler.is_running());
        let timed_out = tokio::time::timeout(Duration::from_millis(50), scheduler.tick())
            .await
            .is_err();
        assert!(timed_out, "tick must never fire before start()");
    }

    #[tokio::test]
    async fn test_tick_fires_after_interval() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), scheduler.tick())
            .await
            .expect("armed scheduler should tick");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.stop();
        scheduler.start(Duration::from_millis(10));
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_rearms_instead_of_duplicating() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_secs(600));
        scheduler.start(Duration::from_millis(10));
        // Old 600s timer was replaced; the new one ticks promptly.
        tokio::time::timeout(Duration::from_secs(1), scheduler.tick())
            .await
            .expect("rearmed scheduler should use the new interval");
    }

    #[test]
    fn test_missed_ack_counting() {
        let mut scheduler = HeartbeatScheduler::new();
        assert_eq!(scheduler.note_sent(), 0);
        scheduler.record_ack();
        assert_eq!(scheduler.note_sent(), 0);
        assert_eq!(scheduler.note_sent(), 1);
        assert_eq!(scheduler.note_sent(), 2);
        scheduler.record_ack();
        assert_eq!(scheduler.note_sent(), 0);
    }

    #[tokio::test]
    async fn test_start_resets_ack_state() {
        let mut scheduler = HeartbeatScheduler::new();
        scheduler.start(Duration::from_secs(1));
        scheduler.note_sent();
        scheduler.note_sent();
        scheduler.start(Duration::from_secs(1));
        assert_eq!(scheduler.note_sent(), 0);
    }
}
