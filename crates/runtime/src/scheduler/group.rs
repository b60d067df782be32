// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Thread groups and their run queues.

use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use parking_lot::{Condvar, Mutex};

use crate::{actor::SchedulingHint, error::Error};

/// A task as seen by the workers: something with queued jobs that runs in
/// bounded batches.
///
/// Whoever holds a `Schedulable` taken from a run queue is its only runner.
/// The task hands out exactly one such token at a time (see
/// [`ActorTask::wake`](crate::actor::task::ActorTask)), which is what keeps
/// two workers from draining the same actor.
pub(crate) trait Schedulable: Send + Sync {
	fn name(&self) -> &str;

	/// Runs at most `budget` jobs. Returns whether the task must be queued
	/// again; `false` means the runner gave its token back.
	fn run_batch(&self, budget: usize) -> bool;

	/// Called once the runtime stops with the task still unfinished: fails
	/// its queued jobs and pending lifecycle futures with `err`.
	fn abandon(&self, err: &Error);
}

pub(crate) type TaskRef = Arc<dyn Schedulable>;

struct Parker {
	lock: Mutex<()>,
	cond: Condvar,
}

/// A fixed set of worker slots serving one scheduling hint.
///
/// Each slot owns a local run queue. New work goes to the least-loaded slot;
/// a slot with nothing to do steals from its siblings, so a task is never
/// pinned to the worker it was first assigned to.
pub(crate) struct ThreadGroup {
	hint: SchedulingHint,
	queues: Vec<Mutex<VecDeque<TaskRef>>>,
	parker: Parker,
}

impl ThreadGroup {
	pub(crate) fn new(hint: SchedulingHint, slots: usize) -> Self {
		Self {
			hint,
			queues: (0..slots).map(|_| Mutex::new(VecDeque::new())).collect(),
			parker: Parker {
				lock: Mutex::new(()),
				cond: Condvar::new(),
			},
		}
	}

	pub(crate) fn hint(&self) -> SchedulingHint {
		self.hint
	}

	pub(crate) fn slots(&self) -> usize {
		self.queues.len()
	}

	/// Queues a task that just became runnable on the least-loaded slot.
	pub(crate) fn push(&self, task: TaskRef) {
		let slot = self
			.queues
			.iter()
			.enumerate()
			.min_by_key(|(_, queue)| queue.lock().len())
			.map(|(slot, _)| slot)
			.unwrap_or(0);
		self.queues[slot].lock().push_back(task);
		self.unpark_one();
	}

	/// Puts a task with remaining work at the back of `slot`'s queue.
	pub(crate) fn requeue(&self, slot: usize, task: TaskRef) {
		self.queues[slot].lock().push_back(task);
		if self.slots() > 1 {
			self.unpark_one();
		}
	}

	/// Next task for `slot`: its own queue first, then a sibling's.
	pub(crate) fn pop(&self, slot: usize) -> Option<TaskRef> {
		if let Some(task) = self.queues[slot].lock().pop_front() {
			return Some(task);
		}

		let slots = self.slots();
		(1..slots).find_map(|offset| self.queues[(slot + offset) % slots].lock().pop_front())
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.queues.iter().all(|queue| queue.lock().is_empty())
	}

	pub(crate) fn len(&self) -> usize {
		self.queues.iter().map(|queue| queue.lock().len()).sum()
	}

	/// Parks the calling worker for at most `timeout` unless work is already
	/// queued or `stop` says otherwise.
	pub(crate) fn park(&self, timeout: Duration, stop: impl Fn() -> bool) {
		let mut guard = self.parker.lock.lock();
		if !self.is_empty() || stop() {
			return;
		}
		self.parker.cond.wait_for(&mut guard, timeout);
	}

	pub(crate) fn unpark_one(&self) {
		let _guard = self.parker.lock.lock();
		self.parker.cond.notify_one();
	}

	pub(crate) fn unpark_all(&self) {
		let _guard = self.parker.lock.lock();
		self.parker.cond.notify_all();
	}

	/// Drops every queued task.
	pub(crate) fn clear(&self) {
		for queue in &self.queues {
			queue.lock().clear();
		}
	}
}

/// Number of tasks currently holding a run token, with a way to wait for
/// it to reach zero.
pub(crate) struct Activity {
	in_flight: AtomicUsize,
	lock: Mutex<()>,
	idle: Condvar,
}

impl Activity {
	pub(crate) fn new() -> Self {
		Self {
			in_flight: AtomicUsize::new(0),
			lock: Mutex::new(()),
			idle: Condvar::new(),
		}
	}

	pub(crate) fn enter(&self) {
		self.in_flight.fetch_add(1, Ordering::SeqCst);
	}

	pub(crate) fn leave(&self) {
		if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
			let _guard = self.lock.lock();
			self.idle.notify_all();
		}
	}

	pub(crate) fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::SeqCst)
	}

	/// Blocks until no task holds a run token, re-checking every `poll`.
	pub(crate) fn wait_idle(&self, poll: Duration) {
		let mut guard = self.lock.lock();
		while self.in_flight() > 0 {
			self.idle.wait_for(&mut guard, poll);
		}
	}
}
