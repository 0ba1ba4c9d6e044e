use std::time::Duration;

/// Decides whether a process gets another run after an unexpected exit.
///
/// `RestartPolicy::default()` restarts forever and immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
	/// Restarts allowed in one streak of consecutive failures. `None` = unlimited.
	pub max_restarts: Option<u32>,
	/// Delay before the first restart of a streak.
	pub delay: Duration,
	/// Multiplier applied to the delay for each further restart in a streak.
	pub backoff_factor: f64,
	pub max_delay: Duration,
	/// A run that lasted at least this long resets the streak.
	pub reset_after: Option<Duration>,
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self {
			max_restarts: None,
			delay: Duration::ZERO,
			backoff_factor: 1.0,
			max_delay: Duration::from_secs(30),
			reset_after: None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RestartDecision {
	Restart { delay: Duration },
	GiveUp,
}

impl RestartPolicy {
	/// Whether the run that just ended was long enough to clear the streak.
	pub fn resets_streak(&self, run_duration: Duration) -> bool {
		matches!(self.reset_after, Some(min) if run_duration >= min)
	}

	/// `attempt` is the 1-based number of this restart within the current streak.
	pub fn decide(&self, attempt: u32) -> RestartDecision {
		if let Some(max) = self.max_restarts {
			if attempt > max {
				return RestartDecision::GiveUp;
			}
		}
		RestartDecision::Restart {
			delay: self.delay_for(attempt),
		}
	}

	fn delay_for(&self, attempt: u32) -> Duration {
		if self.delay.is_zero() {
			return Duration::ZERO;
		}
		let exp = attempt.saturating_sub(1).min(63) as i32;
		let factor = self.backoff_factor.max(1.0).powi(exp);
		let millis = self.delay.as_millis() as f64 * factor;
		if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
			return self.max_delay.max(self.delay);
		}
		Duration::from_millis(millis as u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_restarts_forever_without_delay() {
		let policy = RestartPolicy::default();
		for attempt in [1, 2, 100, u32::MAX] {
			assert_eq!(policy.decide(attempt), RestartDecision::Restart { delay: Duration::ZERO });
		}
	}

	#[test]
	fn cap_gives_up_after_max() {
		let policy = RestartPolicy {
			max_restarts: Some(2),
			..RestartPolicy::default()
		};
		assert!(matches!(policy.decide(1), RestartDecision::Restart { .. }));
		assert!(matches!(policy.decide(2), RestartDecision::Restart { .. }));
		assert_eq!(policy.decide(3), RestartDecision::GiveUp);
	}

	#[test]
	fn backoff_grows_and_is_capped() {
		let policy = RestartPolicy {
			delay: Duration::from_millis(100),
			backoff_factor: 2.0,
			max_delay: Duration::from_millis(500),
			..RestartPolicy::default()
		};
		let delays: Vec<Duration> = (1..=5)
			.map(|n| match policy.decide(n) {
				RestartDecision::Restart { delay } => delay,
				RestartDecision::GiveUp => panic!("unexpected give up"),
			})
			.collect();
		assert_eq!(
			delays,
			vec![
				Duration::from_millis(100),
				Duration::from_millis(200),
				Duration::from_millis(400),
				Duration::from_millis(500),
				Duration::from_millis(500),
			]
		);
	}

	#[test]
	fn streak_reset() {
		let policy = RestartPolicy {
			reset_after: Some(Duration::from_secs(10)),
			..RestartPolicy::default()
		};
		assert!(!policy.resets_streak(Duration::from_secs(3)));
		assert!(policy.resets_streak(Duration::from_secs(10)));
		assert!(!RestartPolicy::default().resets_streak(Duration::from_secs(3600)));
	}
}
