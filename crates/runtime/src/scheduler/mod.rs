// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! The scheduler facade.
//!
//! A [`Scheduler`] owns two thread groups (CPU-bound and IO-bound), the timer
//! queue and the clock. Actors are submitted to it and from then on run as
//! cooperative tasks on the group named by their [`SchedulingHint`].
//!
//! The same facade runs in one of two [`ExecutionMode`]s:
//! - `Threaded`: worker OS threads drain the groups
//! - `Controlled`: nothing runs until the caller steps the scheduler with
//!   [`Scheduler::work_until_idle`] or [`Scheduler::advance`], on the calling
//!   thread
//!
//! # Example
//!
//! ```ignore
//! let clock = MockClock::new();
//! let scheduler = Scheduler::builder().clock(clock.clone()).controlled().build();
//! scheduler.start()?;
//!
//! let handle = scheduler.submit(Counter::default())?;
//! handle.run(|counter, _| { counter.value += 1; Ok(()) })?;
//! scheduler.work_until_idle();
//! ```

mod config;
pub(crate) mod group;
pub(crate) mod shared;
mod thread;
mod worker;

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	thread::JoinHandle,
	time::Duration,
};

pub use config::SchedulerConfig;
use parking_lot::Mutex;
pub use shared::{FatalHandler, abort_on_fatal};
pub use thread::{NamedThreadFactory, ThreadFactory};
use tracing::{debug, warn};

use self::{shared::Shared, thread::worker_name, worker::Worker};
use crate::{
	actor::{Actor, ActorHandle, SchedulingHint, task::ActorTask},
	clock::{Clock, duration_to_nanos},
	error::{Error, Result},
	future::ActorFuture,
};

/// How the scheduler executes tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
	/// Worker threads run tasks as soon as they are runnable.
	#[default]
	Threaded,
	/// Tasks only run inside `work_until_idle` and `advance`, on the calling
	/// thread. Deterministic when paired with a [`MockClock`](crate::MockClock).
	Controlled,
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
	config: SchedulerConfig,
	clock: Clock,
	mode: ExecutionMode,
	thread_factory: Arc<dyn ThreadFactory>,
	fatal_handler: FatalHandler,
}

impl SchedulerBuilder {
	pub fn new() -> Self {
		Self {
			config: SchedulerConfig::default(),
			clock: Clock::default(),
			mode: ExecutionMode::default(),
			thread_factory: Arc::new(NamedThreadFactory),
			fatal_handler: abort_on_fatal(),
		}
	}

	pub fn config(mut self, config: SchedulerConfig) -> Self {
		self.config = config;
		self
	}

	pub fn cpu_threads(mut self, threads: usize) -> Self {
		self.config.cpu_threads = threads;
		self
	}

	pub fn io_threads(mut self, threads: usize) -> Self {
		self.config.io_threads = threads;
		self
	}

	pub fn clock(mut self, clock: impl Into<Clock>) -> Self {
		self.clock = clock.into();
		self
	}

	pub fn mode(mut self, mode: ExecutionMode) -> Self {
		self.mode = mode;
		self
	}

	/// Shorthand for `mode(ExecutionMode::Controlled)`.
	pub fn controlled(self) -> Self {
		self.mode(ExecutionMode::Controlled)
	}

	pub fn thread_factory(mut self, factory: impl ThreadFactory) -> Self {
		self.thread_factory = Arc::new(factory);
		self
	}

	/// Replaces the default reaction to [`Error::Fatal`], which logs and
	/// aborts the process.
	pub fn fatal_handler<F>(mut self, handler: F) -> Self
	where
		F: Fn(&str, &Error) + Send + Sync + 'static,
	{
		self.fatal_handler = Arc::new(handler);
		self
	}

	pub fn build(self) -> Scheduler {
		let config = self.config.normalized();
		let shared = Arc::new(Shared::new(&config, self.clock, self.fatal_handler));
		Scheduler {
			config,
			mode: self.mode,
			shared,
			thread_factory: self.thread_factory,
			workers: Mutex::new(Vec::new()),
			running: AtomicBool::new(false),
		}
	}
}

impl Default for SchedulerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Runs actors on fixed pools of worker threads.
///
/// Actors may be submitted before [`start`](Scheduler::start); their startup
/// job runs once workers are up. Dropping a running scheduler stops it.
pub struct Scheduler {
	config: SchedulerConfig,
	mode: ExecutionMode,
	shared: Arc<Shared>,
	thread_factory: Arc<dyn ThreadFactory>,
	workers: Mutex<Vec<JoinHandle<()>>>,
	running: AtomicBool,
}

impl Scheduler {
	pub fn builder() -> SchedulerBuilder {
		SchedulerBuilder::new()
	}

	/// Threaded scheduler on the host clock.
	pub fn new(config: SchedulerConfig) -> Self {
		Self::builder().config(config).build()
	}

	pub fn config(&self) -> &SchedulerConfig {
		&self.config
	}

	pub fn mode(&self) -> ExecutionMode {
		self.mode
	}

	pub fn clock(&self) -> &Clock {
		&self.shared.clock
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Spawns the worker threads. In controlled mode nothing is spawned.
	pub fn start(&self) -> Result<()> {
		if self.shared.is_stopped() {
			return Err(Error::rejected("scheduler is stopped"));
		}
		if self.running.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		if self.mode == ExecutionMode::Controlled {
			debug!("scheduler started in controlled mode");
			return Ok(());
		}

		let groups = [
			(SchedulingHint::CpuBound, self.config.cpu_threads),
			(SchedulingHint::IoBound, self.config.io_threads),
		];

		let mut workers = self.workers.lock();
		for (hint, count) in groups {
			for slot in 0..count {
				let name = worker_name(&self.config.thread_name_prefix, hint, slot);
				let worker = Worker::new(name.clone(), hint, slot, self.shared.clone());
				match self.thread_factory.spawn(name.clone(), hint, Box::new(move || worker.run())) {
					Ok(handle) => workers.push(handle),
					Err(err) => {
						drop(workers);
						self.stop();
						return Err(Error::ThreadSpawn {
							name,
							reason: err.to_string(),
						});
					}
				}
			}
		}

		debug!(
			cpu_threads = self.config.cpu_threads,
			io_threads = self.config.io_threads,
			"scheduler started"
		);
		Ok(())
	}

	/// Refuses further submissions, lets queued work drain and joins the
	/// workers. Idempotent.
	///
	/// Actors still open afterwards are abandoned: their remaining jobs and
	/// their startup and close futures fail with
	/// [`Error::SchedulingRejected`].
	pub fn stop(&self) {
		if !self.shared.mark_stopped() {
			return;
		}
		debug!(
			queued = self.shared.groups().iter().map(|group| group.len()).sum::<usize>(),
			in_flight = self.shared.activity.in_flight(),
			actors = self.shared.live_tasks(),
			timers = self.shared.timers.len(),
			"scheduler stopping"
		);

		match self.mode {
			ExecutionMode::Threaded => {
				for group in self.shared.groups() {
					group.unpark_all();
				}

				let current = std::thread::current().id();
				let workers: Vec<_> = self.workers.lock().drain(..).collect();
				for handle in workers {
					if handle.thread().id() == current {
						warn!("scheduler stopped from one of its own workers, not joining it");
						continue;
					}
					if handle.join().is_err() {
						warn!("worker thread panicked");
					}
				}
			}
			ExecutionMode::Controlled => while self.shared.run_round() {},
		}

		self.shared.clear();
		self.running.store(false, Ordering::SeqCst);
		debug!("scheduler stopped");
	}

	/// Submits `actor` on the group named by its [`ActorConfig`](crate::ActorConfig).
	pub fn submit<A: Actor>(&self, actor: A) -> Result<ActorHandle<A>> {
		let hint = actor.config().hint;
		self.submit_with_hint(actor, hint)
	}

	/// Submits `actor` on the group serving `hint`.
	pub fn submit_with_hint<A: Actor>(&self, actor: A, hint: SchedulingHint) -> Result<ActorHandle<A>> {
		if self.shared.is_stopped() {
			let err = Error::rejected("scheduler is stopped");
			warn!(actor = %actor.name(), error = %err, "submission rejected");
			return Err(err);
		}

		let task = ActorTask::new(actor, hint, self.shared.clone());
		// The registry keeps the actor alive until it closes or fails, whether
		// or not the caller keeps the handle.
		if !self.shared.register(task.id(), task.clone()) {
			let err = Error::rejected("scheduler is stopped");
			warn!(actor = %task.name(), error = %err, "submission rejected");
			return Err(err);
		}
		task.start();
		Ok(ActorHandle::new(task))
	}

	pub fn close<A: Actor>(&self, handle: &ActorHandle<A>) -> ActorFuture<()> {
		handle.close()
	}

	/// Runs until no task is runnable and no timer is due.
	///
	/// Controlled mode does the work on the calling thread. Threaded mode
	/// waits for the workers instead; before `start` it only fires due
	/// timers.
	pub fn work_until_idle(&self) {
		match self.mode {
			ExecutionMode::Controlled => loop {
				let fired = self.shared.fire_due_timers();
				let ran = self.shared.run_round();
				if fired == 0 && !ran {
					break;
				}
			},
			ExecutionMode::Threaded => {
				loop {
					self.shared.fire_due_timers();
					if !self.is_running() {
						return;
					}
					self.shared.activity.wait_idle(self.shared.park_timeout());
					if !self.shared.timers.has_due(self.shared.clock.now_nanos()) {
						break;
					}
				}
			}
		}
	}

	/// Moves the mock clock forward by `duration`, stopping at every timer
	/// deadline on the way so each firing sees the time it was due at.
	///
	/// Fails with [`Error::ClockNotControlled`] on the host clock.
	pub fn advance(&self, duration: Duration) -> Result<()> {
		let Some(mock) = self.shared.clock.as_mock() else {
			return Err(Error::ClockNotControlled);
		};
		let target = self.shared.clock.now_nanos().saturating_add(duration_to_nanos(duration));

		self.work_until_idle();
		while let Some(due) = self.shared.timers.next_due() {
			if due > target {
				break;
			}
			let now = mock.now_nanos();
			if due > now {
				mock.add_time(Duration::from_nanos(due - now));
			}
			self.work_until_idle();
		}

		let now = mock.now_nanos();
		if target > now {
			mock.add_time(Duration::from_nanos(target - now));
		}
		self.work_until_idle();
		Ok(())
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		self.stop();
	}
}
