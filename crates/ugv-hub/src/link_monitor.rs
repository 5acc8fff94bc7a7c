//! [`LinkMonitor`] – derives the `status` topic from telemetry liveness.
//!
//! The hub calls [`LinkMonitor::observe`] for every telemetry update and
//! [`LinkMonitor::check`] periodically. When nothing has arrived within the
//! timeout the link is reported `Disconnected`; the next update reports it
//! `Connected` again. Each transition is reported once.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};
use ugv_types::LinkStatus;

pub struct LinkMonitor {
    timeout: Duration,
    last_seen: Option<Instant>,
    reported: LinkStatus,
}

impl LinkMonitor {
    /// Starts out `Disconnected` until the first update.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: None,
            reported: LinkStatus::Disconnected,
        }
    }

    /// Record telemetry arriving at `now`. Returns `Some(Connected)` when
    /// this ends a silent period.
    pub fn observe(&mut self, now: Instant) -> Option<LinkStatus> {
        self.last_seen = Some(now);
        if self.reported == LinkStatus::Connected {
            return None;
        }
        info!("telemetry link up");
        self.reported = LinkStatus::Connected;
        Some(LinkStatus::Connected)
    }

    /// Returns `Some(Disconnected)` the first time the deadline is missed.
    pub fn check(&mut self, now: Instant) -> Option<LinkStatus> {
        let last = self.last_seen?;
        if self.reported != LinkStatus::Connected || now.duration_since(last) <= self.timeout {
            return None;
        }
        warn!(silent_ms = now.duration_since(last).as_millis() as u64, "telemetry link lost");
        self.reported = LinkStatus::Disconnected;
        Some(LinkStatus::Disconnected)
    }

    pub fn status(&self) -> LinkStatus {
        self.reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_reports_connected_once() {
        let mut monitor = LinkMonitor::new(Duration::from_millis(500));
        let now = Instant::now();
        assert_eq!(monitor.observe(now), Some(LinkStatus::Connected));
        assert_eq!(monitor.observe(now), None);
        assert_eq!(monitor.status(), LinkStatus::Connected);
    }

    #[test]
    fn silence_past_deadline_reports_disconnected_once() {
        let mut monitor = LinkMonitor::new(Duration::from_millis(500));
        let start = Instant::now();
        monitor.observe(start);

        assert_eq!(monitor.check(start + Duration::from_millis(400)), None);
        assert_eq!(
            monitor.check(start + Duration::from_millis(600)),
            Some(LinkStatus::Disconnected)
        );
        assert_eq!(monitor.check(start + Duration::from_millis(900)), None);
    }

    #[test]
    fn recovers_after_silence() {
        let mut monitor = LinkMonitor::new(Duration::from_millis(100));
        let start = Instant::now();
        monitor.observe(start);
        monitor.check(start + Duration::from_millis(200));

        assert_eq!(
            monitor.observe(start + Duration::from_millis(250)),
            Some(LinkStatus::Connected)
        );
    }

    #[test]
    fn never_seen_link_stays_quiet() {
        let mut monitor = LinkMonitor::new(Duration::from_millis(10));
        assert_eq!(monitor.check(Instant::now() + Duration::from_secs(5)), None);
        assert_eq!(monitor.status(), LinkStatus::Disconnected);
    }
}
