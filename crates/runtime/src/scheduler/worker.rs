// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! The cooperative run loop of a worker thread.

use std::sync::Arc;

use tracing::debug;

use super::shared::Shared;
use crate::actor::SchedulingHint;

pub(crate) struct Worker {
	name: String,
	hint: SchedulingHint,
	slot: usize,
	shared: Arc<Shared>,
}

impl Worker {
	pub(crate) fn new(name: String, hint: SchedulingHint, slot: usize, shared: Arc<Shared>) -> Self {
		Self {
			name,
			hint,
			slot,
			shared,
		}
	}

	/// Runs until the scheduler is stopped and the group has no queued work.
	///
	/// Each iteration:
	/// 1. Take the next task (own queue, then a sibling's)
	/// 2. Run a bounded batch of its jobs
	/// 3. Re-queue it at the back if it still has jobs
	/// 4. Fire due timers, which queue jobs onto their actors
	/// 5. Park until the next timer is due or work arrives
	pub(crate) fn run(self) {
		debug!(worker = %self.name, "worker starting");
		let shared = &self.shared;
		let group = shared.group(self.hint);

		loop {
			let ran = match group.pop(self.slot) {
				Some(task) => {
					shared.run_task(group, self.slot, task);
					true
				}
				None => false,
			};

			let fired = shared.fire_due_timers();

			if ran || fired > 0 {
				continue;
			}

			if shared.is_stopped() && group.is_empty() {
				break;
			}

			group.park(shared.park_duration(), || shared.is_stopped());
		}

		debug!(worker = %self.name, "worker stopped");
	}
}
