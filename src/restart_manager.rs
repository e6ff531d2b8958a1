use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the supervisor does when the detection service dies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Bring the service back after any restartable failure
    #[default]
    Sticky,
    NotSticky,
}

/// Restart bookkeeping with exponential backoff.
#[derive(Clone, Debug)]
pub struct RestartState {
    pub name: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
    pub current_cooldown: Duration,
}

impl RestartState {
    pub fn new(name: &str, max_attempts: u32, base_cooldown: Duration, max_cooldown: Duration) -> Self {
        RestartState {
            name: name.to_string(),
            attempts: 0,
            max_attempts,
            base_cooldown,
            max_cooldown,
            current_cooldown: base_cooldown,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn record_failed_attempt(&mut self) -> Duration {
        let delay = self.current_cooldown;
        self.attempts += 1;

        // x1.5 per failure, capped
        self.current_cooldown = Duration::from_secs_f64(
            (self.current_cooldown.as_secs_f64() * 1.5).min(self.max_cooldown.as_secs_f64()),
        );

        warn!(
            "[RESTART] {} failed (attempt {}/{}), next retry in {:.1}s",
            self.name,
            self.attempts,
            self.max_attempts,
            delay.as_secs_f64()
        );
        delay
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            info!(
                "[RESTART] ✓ {} ran to completion after {} restart(s)",
                self.name, self.attempts
            );
        }
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
    }

    pub fn can_restart(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn status(&self) -> String {
        if self.attempts == 0 {
            return format!("{}: OK", self.name);
        }
        if !self.can_restart() {
            return format!("{}: MAX_ATTEMPTS_EXCEEDED", self.name);
        }
        format!(
            "{}: RESTARTING (attempt {}/{}, cooldown {:.1}s)",
            self.name,
            self.attempts,
            self.max_attempts,
            self.current_cooldown.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(max_attempts: u32) -> RestartState {
        RestartState::new(
            "test",
            max_attempts,
            Duration::from_secs(2),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let mut state = state(60);
        let delays: Vec<f64> = (0..10)
            .map(|_| state.record_failed_attempt().as_secs_f64())
            .collect();
        assert_relative_eq!(delays[0], 2.0);
        assert_relative_eq!(delays[1], 3.0);
        assert_relative_eq!(delays[2], 4.5);
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(delays[9], 30.0);
    }

    #[test]
    fn test_max_attempts() {
        let mut state = state(2);
        assert!(state.can_restart());
        state.record_failed_attempt();
        assert!(state.can_restart());
        state.record_failed_attempt();
        assert!(!state.can_restart());
        assert!(state.status().contains("MAX_ATTEMPTS_EXCEEDED"));
    }

    #[test]
    fn test_success_resets() {
        let mut state = state(5);
        state.record_failed_attempt();
        state.record_failed_attempt();
        state.record_success();
        assert_eq!(state.attempts, 0);
        assert_eq!(state.current_cooldown, Duration::from_secs(2));
        assert_eq!(state.status(), "test: OK");
    }

    #[test]
    fn test_default_policy_is_sticky() {
        assert_eq!(RestartPolicy::default(), RestartPolicy::Sticky);
    }
}
