// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Delayed and periodic timers.
//!
//! - [`TimerHandle`]: A handle to cancel a scheduled timer
//! - `TimerQueue`: Time-ordered queue of pending timers, drained by the
//!   workers on every loop iteration
//!
//! Due times are readings of the scheduler's [`Clock`](crate::clock::Clock),
//! never of the host clock directly, so a mock clock decides exactly which
//! timers are due.

mod queue;

use std::sync::{
	Arc,
	atomic::{AtomicU8, AtomicU64, Ordering},
};

pub(crate) use queue::{TimerKind, TimerQueue, period_nanos};

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to a scheduled timer.
///
/// Can be used to cancel the timer before it fires. Cancellation only flips a
/// shared flag; the queue discards the entry when it next looks at it.
#[derive(Clone)]
pub struct TimerHandle {
	id: u64,
	state: Arc<AtomicU8>,
}

impl TimerHandle {
	pub(crate) fn new(id: u64) -> Self {
		Self {
			id,
			state: Arc::new(AtomicU8::new(ARMED)),
		}
	}

	/// Cancel this timer.
	///
	/// Returns `true` if this call prevented a pending firing. A one-shot
	/// timer that already fired, or a timer that was already cancelled,
	/// returns `false`.
	pub fn cancel(&self) -> bool {
		self.state.compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst).is_ok()
	}

	/// Check if this timer has been cancelled.
	pub fn is_cancelled(&self) -> bool {
		self.state.load(Ordering::SeqCst) == CANCELLED
	}

	/// Whether the timer may still fire.
	pub fn is_armed(&self) -> bool {
		self.state.load(Ordering::SeqCst) == ARMED
	}

	/// Get the timer ID.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Claims a one-shot firing. Fails if the timer was cancelled.
	pub(crate) fn claim(&self) -> bool {
		self.state.compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst).is_ok()
	}
}

impl std::fmt::Debug for TimerHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TimerHandle")
			.field("id", &self.id)
			.field("armed", &self.is_armed())
			.field("cancelled", &self.is_cancelled())
			.finish()
	}
}

/// Counter for generating unique timer IDs.
static TIMER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_timer_id() -> u64 {
	TIMER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
