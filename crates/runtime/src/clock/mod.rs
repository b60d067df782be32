// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Time sources for the runtime.
//!
//! All due-time math in the runtime goes through a [`Clock`] value that is
//! constructed once and handed to the scheduler, its workers, every
//! [`ActorControl`](crate::actor::ActorControl) and every future created by
//! the runtime. There is no ambient "current clock": two schedulers built with
//! two different clocks never observe each other's time.
//!
//! - [`Clock::Real`]: backed by the host's monotonic and wall clocks
//! - [`Clock::Mock`]: a [`MockClock`] that only moves when a test moves it

mod mock;

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub use mock::MockClock;

/// Host-backed clock. Monotonic readings are measured from the instant the
/// clock was created.
#[derive(Debug, Clone, Copy)]
pub struct RealClock {
	origin: Instant,
}

impl RealClock {
	pub fn new() -> Self {
		Self {
			origin: Instant::now(),
		}
	}

	fn now_nanos(&self) -> u64 {
		duration_to_nanos(self.origin.elapsed())
	}

	fn now_millis(&self) -> u64 {
		SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
	}
}

impl Default for RealClock {
	fn default() -> Self {
		Self::new()
	}
}

/// A swappable source of monotonic and wall-clock time.
#[derive(Debug, Clone)]
pub enum Clock {
	Real(RealClock),
	Mock(MockClock),
}

impl Clock {
	pub fn real() -> Self {
		Clock::Real(RealClock::new())
	}

	pub fn mock(clock: MockClock) -> Self {
		Clock::Mock(clock)
	}

	/// Monotonic time in nanoseconds. Only differences between readings of
	/// the same clock are meaningful.
	pub fn now_nanos(&self) -> u64 {
		match self {
			Clock::Real(clock) => clock.now_nanos(),
			Clock::Mock(clock) => clock.now_nanos(),
		}
	}

	/// Wall-clock time in milliseconds since the Unix epoch.
	pub fn now_millis(&self) -> u64 {
		match self {
			Clock::Real(clock) => clock.now_millis(),
			Clock::Mock(clock) => clock.now_millis(),
		}
	}

	/// Monotonic deadline `delay` from now.
	pub fn deadline_after(&self, delay: Duration) -> u64 {
		self.now_nanos().saturating_add(duration_to_nanos(delay))
	}

	/// Time left until `deadline`, zero once it has passed.
	pub fn until(&self, deadline: u64) -> Duration {
		Duration::from_nanos(deadline.saturating_sub(self.now_nanos()))
	}

	pub fn as_mock(&self) -> Option<&MockClock> {
		match self {
			Clock::Mock(clock) => Some(clock),
			Clock::Real(_) => None,
		}
	}

	pub fn is_mock(&self) -> bool {
		matches!(self, Clock::Mock(_))
	}
}

impl Default for Clock {
	fn default() -> Self {
		Clock::real()
	}
}

impl From<MockClock> for Clock {
	fn from(clock: MockClock) -> Self {
		Clock::Mock(clock)
	}
}

pub(crate) fn duration_to_nanos(duration: Duration) -> u64 {
	u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
