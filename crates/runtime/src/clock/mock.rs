// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::duration_to_nanos;

const NANOS_PER_MILLI: u64 = 1_000_000;

#[derive(Debug)]
struct MockState {
	/// Frozen reading, if the clock is pinned.
	pinned: Option<u64>,
	/// Reading at `origin` when running unpinned.
	base: u64,
	/// Accumulated `add_time` while unpinned.
	offset: u64,
	origin: Instant,
}

impl MockState {
	fn now(&self) -> u64 {
		match self.pinned {
			Some(nanos) => nanos,
			None => self.base.saturating_add(duration_to_nanos(self.origin.elapsed())).saturating_add(self.offset),
		}
	}
}

/// A clock whose time is moved explicitly by tests.
///
/// The mock keeps a single timeline: the monotonic reading in nanoseconds
/// and the wall reading in milliseconds are two views of the same value.
/// A pinned clock never moves on its own; an unpinned one follows the host
/// clock plus whatever was added with [`MockClock::add_time`].
///
/// Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct MockClock {
	state: Arc<Mutex<MockState>>,
}

impl MockClock {
	/// Creates a clock pinned at time zero.
	pub fn new() -> Self {
		Self::starting_at(0)
	}

	/// Creates a clock pinned at `millis` since the epoch.
	pub fn starting_at(millis: u64) -> Self {
		Self {
			state: Arc::new(Mutex::new(MockState {
				pinned: Some(millis.saturating_mul(NANOS_PER_MILLI)),
				base: 0,
				offset: 0,
				origin: Instant::now(),
			})),
		}
	}

	/// Creates a clock starting at zero that advances with the host clock.
	pub fn unpinned() -> Self {
		Self {
			state: Arc::new(Mutex::new(MockState {
				pinned: None,
				base: 0,
				offset: 0,
				origin: Instant::now(),
			})),
		}
	}

	pub fn now_nanos(&self) -> u64 {
		self.state.lock().now()
	}

	pub fn now_millis(&self) -> u64 {
		self.now_nanos() / NANOS_PER_MILLI
	}

	/// Freezes the clock at its current reading.
	pub fn pin_current_time(&self) {
		let mut state = self.state.lock();
		let now = state.now();
		state.pinned = Some(now);
	}

	/// Moves the clock forward by `duration`.
	pub fn add_time(&self, duration: Duration) {
		let nanos = duration_to_nanos(duration);
		let mut state = self.state.lock();
		match state.pinned.as_mut() {
			Some(pinned) => *pinned = pinned.saturating_add(nanos),
			None => state.offset = state.offset.saturating_add(nanos),
		}
	}

	/// Pins the clock at `millis` since the epoch.
	pub fn set_current_time(&self, millis: u64) {
		self.set_current_nanos(millis.saturating_mul(NANOS_PER_MILLI));
	}

	/// Pins the clock at an exact nanosecond reading.
	pub fn set_current_nanos(&self, nanos: u64) {
		self.state.lock().pinned = Some(nanos);
	}

	pub fn is_pinned(&self) -> bool {
		self.state.lock().pinned.is_some()
	}
}

impl Default for MockClock {
	fn default() -> Self {
		Self::new()
	}
}
