use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// Fix-silence tracking for the location subscription.
///
/// The provider is never retried on error; instead the service asks this
/// monitor on every health tick whether fixes have stopped arriving and, if
/// so, resubscribes at the current cadence.
#[derive(Clone, Debug)]
pub struct LocationHealth {
    last_fix: Instant,
    silence_threshold: Duration,
    fixes: u64,
    skipped: u64,
    resubscriptions: u32,
}

impl LocationHealth {
    pub fn new(silence_threshold: Duration, now: Instant) -> Self {
        LocationHealth {
            last_fix: now,
            silence_threshold,
            fixes: 0,
            skipped: 0,
            resubscriptions: 0,
        }
    }

    pub fn record_fix(&mut self, now: Instant) {
        self.last_fix = now;
        self.fixes += 1;
    }

    /// An update arrived without a location. It proves the subscription is
    /// alive but carries nothing to process.
    pub fn record_skipped(&mut self, now: Instant) {
        self.last_fix = now;
        self.skipped += 1;
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_fix)
    }

    pub fn is_silent(&self, now: Instant) -> bool {
        self.silence(now) > self.silence_threshold
    }

    /// Record a resubscription; the silence clock restarts so the next one
    /// waits a full threshold.
    pub fn record_resubscribe(&mut self, now: Instant) {
        warn!(
            "[HEALTH] Location SILENT for {:.1}s, resubscribing (#{})",
            self.silence(now).as_secs_f64(),
            self.resubscriptions + 1
        );
        self.resubscriptions += 1;
        self.last_fix = now;
    }

    pub fn report(&self, now: Instant) -> HealthReport {
        HealthReport {
            healthy: !self.is_silent(now),
            silence_secs: self.silence(now).as_secs_f64(),
            fixes: self.fixes,
            skipped: self.skipped,
            resubscriptions: self.resubscriptions,
        }
    }

    pub fn format_status(&self, now: Instant) -> String {
        let report = self.report(now);
        let status = if report.healthy {
            "✓".to_string()
        } else {
            format!("⚠ (silent {:.1}s)", report.silence_secs)
        };
        format!(
            "Health: GPS {} | fixes {} | skipped {} | resubscribed {}",
            status, report.fixes, report.skipped, report.resubscriptions
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub silence_secs: f64,
    pub fixes: u64,
    pub skipped: u64,
    pub resubscriptions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_detection() {
        let t0 = Instant::now();
        let mut health = LocationHealth::new(Duration::from_secs(30), t0);
        assert!(!health.is_silent(t0 + Duration::from_secs(30)));
        assert!(health.is_silent(t0 + Duration::from_secs(31)));

        health.record_fix(t0 + Duration::from_secs(31));
        assert!(!health.is_silent(t0 + Duration::from_secs(40)));
        assert_eq!(health.report(t0 + Duration::from_secs(40)).fixes, 1);
    }

    #[test]
    fn test_empty_updates_keep_subscription_healthy() {
        let t0 = Instant::now();
        let mut health = LocationHealth::new(Duration::from_secs(10), t0);
        health.record_skipped(t0 + Duration::from_secs(8));
        assert!(!health.is_silent(t0 + Duration::from_secs(15)));
        let report = health.report(t0 + Duration::from_secs(15));
        assert_eq!(report.skipped, 1);
        assert_eq!(report.fixes, 0);
    }

    #[test]
    fn test_resubscribe_restarts_clock() {
        let t0 = Instant::now();
        let mut health = LocationHealth::new(Duration::from_secs(10), t0);
        let late = t0 + Duration::from_secs(20);
        assert!(health.is_silent(late));
        health.record_resubscribe(late);
        assert!(!health.is_silent(late + Duration::from_secs(5)));
        assert_eq!(health.report(late).resubscriptions, 1);
    }

    #[test]
    fn test_format_status() {
        let t0 = Instant::now();
        let health = LocationHealth::new(Duration::from_secs(10), t0);
        assert!(health.format_status(t0).contains("✓"));
        assert!(health
            .format_status(t0 + Duration::from_secs(12))
            .contains("silent 12.0s"));
    }
}
