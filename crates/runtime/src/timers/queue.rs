// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{
	cmp::Ordering as CmpOrdering,
	collections::BinaryHeap,
	sync::Arc,
	time::Duration,
};

use parking_lot::Mutex;
use tracing::trace;

use super::{TimerHandle, next_timer_id};
use crate::clock::duration_to_nanos;

pub(crate) enum TimerKind {
	/// Fire once and remove.
	Once {
		callback: Box<dyn FnOnce() + Send>,
	},
	/// Fire repeatedly until cancelled or the callback returns false.
	Repeat {
		callback: Arc<dyn Fn() -> bool + Send + Sync>,
		period: u64,
	},
}

struct TimerEntry {
	/// Clock reading at which the timer is due.
	due: u64,
	handle: TimerHandle,
	kind: TimerKind,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
	fn eq(&self, other: &Self) -> bool {
		self.due == other.due && self.handle.id() == other.handle.id()
	}
}

impl Ord for TimerEntry {
	// BinaryHeap is a max-heap, so we reverse the ordering to get a min-heap by due time.
	fn cmp(&self, other: &Self) -> CmpOrdering {
		other.due.cmp(&self.due).then_with(|| other.handle.id().cmp(&self.handle.id()))
	}
}

impl PartialOrd for TimerEntry {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

/// A timer taken off the queue by [`TimerQueue::poll_due`], to be fired
/// outside the queue lock.
pub(crate) enum DueTimer {
	Once(Box<dyn FnOnce() + Send>),
	Repeat {
		callback: Arc<dyn Fn() -> bool + Send + Sync>,
		handle: TimerHandle,
	},
}

impl DueTimer {
	pub(crate) fn fire(self) {
		match self {
			DueTimer::Once(callback) => callback(),
			DueTimer::Repeat {
				callback,
				handle,
			} => {
				if handle.is_armed() && !callback() {
					handle.cancel();
				}
			}
		}
	}
}

/// Time-ordered queue of pending timers.
///
/// Entries are ordered by due time, then by creation order. Cancelled entries
/// stay in the heap until they reach the top and are dropped there.
pub(crate) struct TimerQueue {
	heap: Mutex<BinaryHeap<TimerEntry>>,
}

impl TimerQueue {
	pub(crate) fn new() -> Self {
		Self {
			heap: Mutex::new(BinaryHeap::new()),
		}
	}

	/// Inserts a timer due at `due`.
	///
	/// A repeating timer with a zero period fires once. Returns the handle and
	/// whether the new entry is now the earliest in the queue.
	pub(crate) fn schedule(&self, due: u64, kind: TimerKind) -> (TimerHandle, bool) {
		let kind = match kind {
			TimerKind::Repeat {
				callback,
				period: 0,
			} => TimerKind::Once {
				callback: Box::new(move || {
					callback();
				}),
			},
			kind => kind,
		};

		let handle = TimerHandle::new(next_timer_id());
		let mut heap = self.heap.lock();
		let earliest = heap.peek().is_none_or(|top| due < top.due);
		heap.push(TimerEntry {
			due,
			handle: handle.clone(),
			kind,
		});
		trace!(timer = handle.id(), due, "timer scheduled");
		(handle, earliest)
	}

	/// Removes and returns every live timer due at or before `now`.
	///
	/// Repeating timers are re-inserted at `now + period`: the next firing is
	/// measured from the time this poll observed, not from the previous due
	/// time, so a late poll shifts the whole schedule.
	pub(crate) fn poll_due(&self, now: u64) -> Vec<DueTimer> {
		let mut due = Vec::new();
		let mut heap = self.heap.lock();

		while heap.peek().is_some_and(|top| top.due <= now) {
			let Some(entry) = heap.pop() else {
				break;
			};

			match entry.kind {
				TimerKind::Once {
					callback,
				} => {
					if entry.handle.claim() {
						due.push(DueTimer::Once(callback));
					}
				}
				TimerKind::Repeat {
					callback,
					period,
				} => {
					if !entry.handle.is_armed() {
						continue;
					}
					due.push(DueTimer::Repeat {
						callback: callback.clone(),
						handle: entry.handle.clone(),
					});
					heap.push(TimerEntry {
						due: now.saturating_add(period),
						handle: entry.handle,
						kind: TimerKind::Repeat {
							callback,
							period,
						},
					});
				}
			}
		}

		if !due.is_empty() {
			trace!(count = due.len(), now, "timers due");
		}
		due
	}

	/// Due time of the earliest live timer.
	pub(crate) fn next_due(&self) -> Option<u64> {
		let mut heap = self.heap.lock();
		while let Some(top) = heap.peek() {
			if top.handle.is_cancelled() {
				heap.pop();
				continue;
			}
			return Some(top.due);
		}
		None
	}

	/// Whether any live timer is due at or before `now`.
	pub(crate) fn has_due(&self, now: u64) -> bool {
		self.next_due().is_some_and(|due| due <= now)
	}

	/// Number of entries, including cancelled ones not yet discarded.
	pub(crate) fn len(&self) -> usize {
		self.heap.lock().len()
	}

	/// Drops every entry.
	pub(crate) fn clear(&self) {
		self.heap.lock().clear();
	}
}

impl Default for TimerQueue {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) fn period_nanos(period: Duration) -> u64 {
	duration_to_nanos(period)
}
