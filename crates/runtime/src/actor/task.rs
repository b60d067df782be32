// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! The task wrapping one actor instance.
//!
//! A task owns the actor, its FIFO job queue and its lifecycle. Jobs can be
//! enqueued from any thread; draining is exclusive. Exclusivity comes from
//! the run token: the `scheduled` flag is set by whoever puts the task on a
//! run queue and cleared only by the worker that ran it, so at most one copy
//! of the task is ever queued or running.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::{
		Arc, Weak,
		atomic::{AtomicBool, Ordering},
	},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
	actor::{
		control::ActorControl,
		job::Job,
		state::ActorState,
		traits::{Actor, SchedulingHint},
	},
	error::{Error, Result},
	future::ActorFuture,
	scheduler::{group::Schedulable, shared::Shared},
	timers::TimerHandle,
};

struct Lifecycle {
	state: ActorState,
	/// A close arrived before `on_start` returned.
	close_pending: bool,
	started: ActorFuture<()>,
	closed: ActorFuture<()>,
	failure: Option<Error>,
}

pub(crate) struct ActorTask<A: Actor> {
	id: u64,
	name: String,
	hint: SchedulingHint,
	actor: Mutex<A>,
	jobs_tx: Sender<Job<A>>,
	jobs_rx: Receiver<Job<A>>,
	lifecycle: Mutex<Lifecycle>,
	scheduled: AtomicBool,
	timers: Mutex<Vec<TimerHandle>>,
	shared: Arc<Shared>,
	this: Weak<ActorTask<A>>,
}

impl<A: Actor> ActorTask<A> {
	pub(crate) fn new(actor: A, hint: SchedulingHint, shared: Arc<Shared>) -> Arc<Self> {
		let name = actor.name();
		let (jobs_tx, jobs_rx) = unbounded();
		let started = ActorFuture::with_clock(shared.clock.clone());
		let closed = ActorFuture::with_clock(shared.clock.clone());

		Arc::new_cyclic(|this| Self {
			id: shared.next_task_id(),
			name,
			hint,
			actor: Mutex::new(actor),
			jobs_tx,
			jobs_rx,
			lifecycle: Mutex::new(Lifecycle {
				state: ActorState::New,
				close_pending: false,
				started,
				closed,
				failure: None,
			}),
			scheduled: AtomicBool::new(false),
			timers: Mutex::new(Vec::new()),
			shared,
			this: this.clone(),
		})
	}

	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	pub(crate) fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn hint(&self) -> SchedulingHint {
		self.hint
	}

	pub(crate) fn shared(&self) -> &Arc<Shared> {
		&self.shared
	}

	pub(crate) fn state(&self) -> ActorState {
		self.lifecycle.lock().state
	}

	pub(crate) fn started_future(&self) -> ActorFuture<()> {
		self.lifecycle.lock().started.clone()
	}

	pub(crate) fn closed_future(&self) -> ActorFuture<()> {
		self.lifecycle.lock().closed.clone()
	}

	/// `New -> Starting`: queues `on_start` as the first job.
	pub(crate) fn start(self: &Arc<Self>) -> ActorFuture<()> {
		let started = {
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.state != ActorState::New {
				return lifecycle.started.clone();
			}
			lifecycle.state = ActorState::Starting;
			lifecycle.started.clone()
		};

		debug!(actor = %self.name, hint = %self.hint, "actor starting");
		self.enqueue(Job::new(|actor: &mut A, ctl: &ActorControl<A>| {
			actor.on_start(ctl)?;
			ctl.task().on_started();
			Ok(())
		}));
		started
	}

	fn on_started(&self) {
		let started = {
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.state != ActorState::Starting {
				return;
			}
			lifecycle.state = if lifecycle.close_pending {
				ActorState::CloseRequested
			} else {
				ActorState::Started
			};
			lifecycle.started.clone()
		};
		debug!(actor = %self.name, "actor started");
		started.complete(());
	}

	/// Requests the actor to close. Idempotent: every call returns the same
	/// future.
	pub(crate) fn close(&self) -> ActorFuture<()> {
		let (closed, enqueue) = {
			let mut lifecycle = self.lifecycle.lock();
			let state = lifecycle.state;
			let enqueue = match state {
				ActorState::New | ActorState::Starting if !lifecycle.close_pending => {
					lifecycle.close_pending = true;
					true
				}
				ActorState::Started => {
					lifecycle.state = ActorState::CloseRequested;
					true
				}
				_ => false,
			};
			(lifecycle.closed.clone(), enqueue)
		};

		if enqueue {
			debug!(actor = %self.name, "close requested");
			self.enqueue(close_job());
		}
		closed
	}

	/// `CloseRequested -> Closing -> Closed`, run as a job once everything
	/// queued before it has run.
	fn finish_close(&self, actor: &mut A, ctl: &ActorControl<A>) -> Result<()> {
		{
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.state != ActorState::CloseRequested {
				return Ok(());
			}
			lifecycle.state = ActorState::Closing;
		}
		self.cancel_timers();

		actor.on_close(ctl)?;

		let closed = {
			let mut lifecycle = self.lifecycle.lock();
			lifecycle.state = ActorState::Closed;
			lifecycle.closed.clone()
		};
		debug!(actor = %self.name, "actor closed");

		// Anything that slipped in while closing will never run.
		self.drain(&Error::rejected(format!("actor '{}' is closed", self.name)));
		self.shared.deregister(self.id);
		closed.complete(());
		Ok(())
	}

	/// Moves the task to `Failed` and discards its queue.
	fn fail(&self, actor: &mut A, ctl: &ActorControl<A>, err: Error) {
		let (previous, started, closed) = {
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.state.is_terminal() {
				return;
			}
			let previous = lifecycle.state;
			lifecycle.state = ActorState::Failed;
			lifecycle.failure = Some(err.clone());
			(previous, lifecycle.started.clone(), lifecycle.closed.clone())
		};

		error!(actor = %self.name, state = %previous, error = %err, "actor failed");
		self.cancel_timers();
		self.drain(&err);

		if catch_unwind(AssertUnwindSafe(|| actor.on_failure(&err))).is_err() {
			warn!(actor = %self.name, "on_failure panicked");
		}

		if previous != ActorState::Closing {
			match catch_unwind(AssertUnwindSafe(|| actor.on_close(ctl))) {
				Ok(Ok(())) => {}
				Ok(Err(close_err)) => {
					warn!(actor = %self.name, error = %close_err, "on_close failed after actor failure")
				}
				Err(_) => warn!(actor = %self.name, "on_close panicked after actor failure"),
			}
		}

		self.shared.deregister(self.id);
		started.complete_exceptionally(err.clone());
		closed.complete_exceptionally(err);
	}

	/// Discards every queued job, failing linked futures with `err`.
	fn drain(&self, err: &Error) {
		let mut discarded = 0usize;
		while let Ok(job) = self.jobs_rx.try_recv() {
			job.abort(err.clone());
			discarded += 1;
		}
		if discarded > 0 {
			debug!(actor = %self.name, discarded, "discarded queued jobs");
		}
	}

	/// Error for work arriving at a task in a terminal state.
	fn terminal_error(&self) -> Option<Error> {
		let lifecycle = self.lifecycle.lock();
		match lifecycle.state {
			ActorState::Failed => lifecycle.failure.clone(),
			ActorState::Closed => Some(Error::rejected(format!("actor '{}' is closed", self.name))),
			_ => None,
		}
	}

	/// Queues a job from outside the actor.
	pub(crate) fn push_external(&self, job: Job<A>) -> Result<()> {
		let rejection = if self.shared.is_stopped() {
			Some(Error::rejected("scheduler is stopped"))
		} else {
			let lifecycle = self.lifecycle.lock();
			if lifecycle.state.accepts_external() && !lifecycle.close_pending {
				None
			} else {
				Some(Error::rejected(format!("actor '{}' is {}", self.name, lifecycle.state)))
			}
		};

		match rejection {
			Some(err) => {
				warn!(actor = %self.name, error = %err, "job rejected");
				job.abort(err.clone());
				Err(err)
			}
			None => {
				self.enqueue(job);
				Ok(())
			}
		}
	}

	/// Queues a job on behalf of the actor itself (self-scheduling, timers,
	/// continuations). Accepted until the task is terminal.
	pub(crate) fn push_internal(&self, job: Job<A>) -> Result<()> {
		let rejection = if self.shared.is_stopped() {
			Some(Error::rejected("scheduler is stopped"))
		} else {
			self.terminal_error()
		};

		match rejection {
			Some(err) => {
				job.abort(err.clone());
				Err(err)
			}
			None => {
				self.enqueue(job);
				Ok(())
			}
		}
	}

	fn enqueue(&self, job: Job<A>) {
		// The receiver lives in `self`, so the channel cannot be disconnected.
		let _ = self.jobs_tx.send(job);
		self.wake();
	}

	/// Puts the task on a run queue unless it already holds the run token.
	fn wake(&self) {
		if self.scheduled.swap(true, Ordering::AcqRel) {
			return;
		}
		let Some(this) = self.this.upgrade() else {
			return;
		};
		self.shared.activity.enter();
		self.shared.group(self.hint).push(this);
	}

	/// Gives the run token back. Returns `true` if the caller must queue the
	/// task again because work arrived in the meantime.
	fn release(&self) -> bool {
		if !self.jobs_rx.is_empty() {
			return true;
		}
		self.scheduled.store(false, Ordering::Release);
		!self.jobs_rx.is_empty() && !self.scheduled.swap(true, Ordering::AcqRel)
	}

	pub(crate) fn register_timer(&self, handle: TimerHandle) {
		let mut timers = self.timers.lock();
		timers.retain(TimerHandle::is_armed);
		timers.push(handle);
	}

	fn cancel_timers(&self) {
		for handle in self.timers.lock().drain(..) {
			handle.cancel();
		}
	}
}

impl<A: Actor> Schedulable for ActorTask<A> {
	fn name(&self) -> &str {
		&self.name
	}

	fn run_batch(&self, budget: usize) -> bool {
		let Some(this) = self.this.upgrade() else {
			return false;
		};

		if let Some(err) = self.terminal_error() {
			self.drain(&err);
			return self.release();
		}

		let control = ActorControl::new(this);
		// Jobs queued while this batch runs belong to the next one.
		let batch = self.jobs_rx.len().min(budget);

		{
			let mut actor = self.actor.lock();
			for _ in 0..batch {
				let Ok(job) = self.jobs_rx.try_recv() else {
					break;
				};

				if let Err(err) = job.execute(&mut actor, &control) {
					if err.is_fatal() {
						self.shared.raise_fatal(&self.name, &err);
					}
					self.fail(&mut actor, &control, err);
					break;
				}
			}
		}

		self.release()
	}

	fn abandon(&self, err: &Error) {
		let (started, closed) = {
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.state.is_terminal() {
				return;
			}
			lifecycle.state = ActorState::Failed;
			lifecycle.failure = Some(err.clone());
			(lifecycle.started.clone(), lifecycle.closed.clone())
		};

		debug!(actor = %self.name, error = %err, "actor abandoned");
		self.cancel_timers();
		self.drain(err);
		started.complete_exceptionally(err.clone());
		closed.complete_exceptionally(err.clone());
	}
}

fn close_job<A: Actor>() -> Job<A> {
	Job::new(|actor: &mut A, ctl: &ActorControl<A>| {
		let task = ctl.task();
		if !task.jobs_rx.is_empty() {
			// Self-scheduled work is still in flight; close after it.
			task.enqueue(close_job());
			return Ok(());
		}
		task.finish_close(actor, ctl)
	})
}
