// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! State shared by the scheduler facade, its workers and every actor task.

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
	time::Duration,
};

use dashmap::DashMap;
use tracing::{debug, error, trace};

use super::{
	config::SchedulerConfig,
	group::{Activity, TaskRef, ThreadGroup},
};
use crate::{
	actor::SchedulingHint,
	clock::Clock,
	error::Error,
	timers::{TimerHandle, TimerKind, TimerQueue},
};

/// Process-wide reaction to [`Error::Fatal`]. Receives the actor name and the
/// error.
pub type FatalHandler = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Logs the error and aborts the process.
pub fn abort_on_fatal() -> FatalHandler {
	Arc::new(|actor, err| {
		error!(actor = %actor, error = %err, "fatal runtime error, aborting");
		std::process::abort();
	})
}

pub(crate) struct Shared {
	pub(crate) clock: Clock,
	pub(crate) timers: TimerQueue,
	pub(crate) activity: Activity,
	/// Every submitted task that has not reached `Closed` or `Failed`.
	tasks: DashMap<u64, TaskRef>,
	next_task_id: AtomicU64,
	cpu: ThreadGroup,
	io: ThreadGroup,
	stopped: AtomicBool,
	job_batch_size: usize,
	park_timeout: Duration,
	fatal: FatalHandler,
}

impl Shared {
	pub(crate) fn new(config: &SchedulerConfig, clock: Clock, fatal: FatalHandler) -> Self {
		Self {
			clock,
			timers: TimerQueue::new(),
			activity: Activity::new(),
			tasks: DashMap::new(),
			next_task_id: AtomicU64::new(0),
			cpu: ThreadGroup::new(SchedulingHint::CpuBound, config.cpu_threads),
			io: ThreadGroup::new(SchedulingHint::IoBound, config.io_threads),
			stopped: AtomicBool::new(false),
			job_batch_size: config.job_batch_size,
			park_timeout: config.park_timeout,
			fatal,
		}
	}

	/// Group serving `hint`. An empty IO group falls back to the CPU group.
	pub(crate) fn group(&self, hint: SchedulingHint) -> &ThreadGroup {
		match hint {
			SchedulingHint::IoBound if self.io.slots() > 0 => &self.io,
			_ => &self.cpu,
		}
	}

	pub(crate) fn groups(&self) -> [&ThreadGroup; 2] {
		[&self.cpu, &self.io]
	}

	pub(crate) fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}

	/// Marks the runtime as stopped. Returns `false` if it already was.
	pub(crate) fn mark_stopped(&self) -> bool {
		!self.stopped.swap(true, Ordering::SeqCst)
	}

	pub(crate) fn next_task_id(&self) -> u64 {
		self.next_task_id.fetch_add(1, Ordering::Relaxed)
	}

	/// Takes ownership of a submitted task. Returns `false` once the runtime
	/// is stopped.
	pub(crate) fn register(&self, id: u64, task: TaskRef) -> bool {
		self.tasks.insert(id, task);
		// Either this sees the stop, or `clear` sees the entry.
		if self.is_stopped() {
			self.deregister(id);
			return false;
		}
		true
	}

	/// Releases a task that reached a terminal state.
	pub(crate) fn deregister(&self, id: u64) {
		self.tasks.remove(&id);
	}

	pub(crate) fn live_tasks(&self) -> usize {
		self.tasks.len()
	}

	pub(crate) fn schedule_timer(&self, delay: Duration, kind: TimerKind) -> TimerHandle {
		let due = self.clock.deadline_after(delay);
		let (handle, earliest) = self.timers.schedule(due, kind);
		if earliest {
			// Parked workers computed their sleep from the previous earliest timer.
			for group in self.groups() {
				group.unpark_all();
			}
		}
		handle
	}

	/// Fires every timer due at the current clock reading. Returns how many
	/// fired.
	pub(crate) fn fire_due_timers(&self) -> usize {
		let due = self.timers.poll_due(self.clock.now_nanos());
		let count = due.len();
		for timer in due {
			timer.fire();
		}
		count
	}

	/// How long a worker with nothing to do may park.
	pub(crate) fn park_duration(&self) -> Duration {
		if self.clock.is_mock() {
			return self.park_timeout;
		}
		match self.timers.next_due() {
			Some(due) => self.clock.until(due).min(self.park_timeout),
			None => self.park_timeout,
		}
	}

	pub(crate) fn park_timeout(&self) -> Duration {
		self.park_timeout
	}

	/// Runs one batch of `task` for the worker in `slot` of `group`.
	pub(crate) fn run_task(&self, group: &ThreadGroup, slot: usize, task: TaskRef) {
		trace!(actor = task.name(), group = %group.hint(), slot, "running batch");
		if task.run_batch(self.job_batch_size) {
			group.requeue(slot, task);
		} else {
			self.activity.leave();
		}
	}

	/// Runs one batch for every slot that has work. Returns whether anything
	/// ran.
	pub(crate) fn run_round(&self) -> bool {
		let mut progressed = false;
		for group in self.groups() {
			for slot in 0..group.slots() {
				if let Some(task) = group.pop(slot) {
					self.run_task(group, slot, task);
					progressed = true;
				}
			}
		}
		progressed
	}

	pub(crate) fn raise_fatal(&self, actor: &str, err: &Error) {
		(self.fatal)(actor, err);
	}

	/// Drops queued tasks and timers, then fails whatever the remaining
	/// tasks still owe: queued jobs, startup and close futures. Releases the
	/// reference cycles through the registry.
	pub(crate) fn clear(&self) {
		for group in self.groups() {
			group.clear();
		}
		self.timers.clear();

		let ids: Vec<u64> = self.tasks.iter().map(|entry| *entry.key()).collect();
		if !ids.is_empty() {
			debug!(tasks = ids.len(), "abandoning unfinished actors");
		}
		let err = Error::rejected("scheduler is stopped");
		for id in ids {
			if let Some((_, task)) = self.tasks.remove(&id) {
				task.abandon(&err);
			}
		}
	}
}
