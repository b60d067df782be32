// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Actor control.
//!
//! The control is what a running job gets next to `&mut self`. It lets the
//! actor:
//! - Queue more work for itself, now or after a delay
//! - Resume once a future settles, without blocking the worker
//! - Request its own close

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
	actor::{
		condition::ActorCondition,
		job::{Job, RepeatedBody},
		state::ActorState,
		task::ActorTask,
		traits::Actor,
	},
	clock::Clock,
	error::{Error, Result},
	future::ActorFuture,
	timers::{TimerHandle, TimerKind, period_nanos},
};

/// Handle to the running actor, passed to every job.
pub struct ActorControl<A: Actor> {
	task: Arc<ActorTask<A>>,
}

impl<A: Actor> Clone for ActorControl<A> {
	fn clone(&self) -> Self {
		Self {
			task: self.task.clone(),
		}
	}
}

impl<A: Actor> ActorControl<A> {
	pub(crate) fn new(task: Arc<ActorTask<A>>) -> Self {
		Self {
			task,
		}
	}

	pub(crate) fn task(&self) -> &Arc<ActorTask<A>> {
		&self.task
	}

	pub fn name(&self) -> &str {
		self.task.name()
	}

	pub fn state(&self) -> ActorState {
		self.task.state()
	}

	/// The scheduler's clock. Use it instead of the host clock so controlled
	/// runs stay deterministic.
	pub fn clock(&self) -> &Clock {
		&self.task.shared().clock
	}

	pub fn is_close_requested(&self) -> bool {
		matches!(self.state(), ActorState::CloseRequested | ActorState::Closing)
	}

	/// Queues `f` behind everything already queued for this actor.
	pub fn run<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		self.task.push_internal(Job::new(f))
	}

	pub fn submit(&self, job: Job<A>) -> Result<()> {
		self.task.push_internal(job)
	}

	/// Queues `f` and returns a future completed with its result.
	pub fn call<T, F>(&self, f: F) -> ActorFuture<T>
	where
		T: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<T> + Send + 'static,
	{
		let future = ActorFuture::with_clock(self.clock().clone());
		// A rejected job fails the future through its abort hook.
		let _ = self.task.push_internal(Job::with_future(future.clone(), f));
		future
	}

	/// Queues `f` once `delay` has elapsed on the scheduler clock.
	///
	/// The timer is cancelled when the actor closes or fails.
	pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
	where
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		let task = Arc::downgrade(&self.task);
		let handle = self.task.shared().schedule_timer(
			delay,
			TimerKind::Once {
				callback: Box::new(move || {
					if let Some(task) = task.upgrade() {
						let _ = task.push_internal(Job::new(f));
					}
				}),
			},
		);
		self.task.register_timer(handle.clone());
		handle
	}

	/// Queues `f` after `delay`, then every `period` after each firing.
	///
	/// The next firing is measured from when the timer actually fired, so
	/// late firings shift the schedule. A zero `period` fires once.
	pub fn schedule_repeating<F>(&self, delay: Duration, period: Duration, f: F) -> TimerHandle
	where
		F: FnMut(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		let body: RepeatedBody<A> = Arc::new(Mutex::new(Box::new(f)));
		let task = Arc::downgrade(&self.task);
		let handle = self.task.shared().schedule_timer(
			delay,
			TimerKind::Repeat {
				callback: Arc::new(move || match task.upgrade() {
					Some(task) => task.push_internal(Job::repeated(body.clone())).is_ok(),
					None => false,
				}),
				period: period_nanos(period),
			},
		);
		self.task.register_timer(handle.clone());
		handle
	}

	/// Queues `f` with the outcome of `future` once it settles.
	///
	/// The continuation runs as a regular job of this actor, never on the
	/// thread that completed the future.
	pub fn run_on_completion<T, F>(&self, future: &ActorFuture<T>, f: F)
	where
		T: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>, Result<T>) -> Result<()> + Send + 'static,
	{
		let task = Arc::downgrade(&self.task);
		future.on_complete(move |outcome| {
			let Some(task) = task.upgrade() else {
				return;
			};
			if let Err(err) = task.push_internal(Job::new(move |actor, ctl| f(actor, ctl, outcome))) {
				debug!(actor = %task.name(), error = %err, "continuation dropped");
			}
		});
	}

	/// Derives a future from `future` whose mapping runs as a job of this
	/// actor, with access to its state.
	///
	/// A failure of `future` is propagated without queuing `f`. An error
	/// returned by `f` fails the actor, as for [`call`](Self::call).
	pub fn then_apply<T, U, F>(&self, future: &ActorFuture<T>, f: F) -> ActorFuture<U>
	where
		T: Clone + Send + 'static,
		U: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>, T) -> Result<U> + Send + 'static,
	{
		let next = ActorFuture::with_clock(self.clock().clone());
		let target = next.clone();
		let task = Arc::downgrade(&self.task);
		future.on_complete(move |outcome| match (outcome, task.upgrade()) {
			(Ok(value), Some(task)) => {
				// A rejected job fails `target` through its abort hook.
				let _ = task.push_internal(Job::with_future(target, move |actor, ctl| f(actor, ctl, value)));
			}
			(Ok(_), None) => {
				target.complete_exceptionally(Error::rejected("actor is gone"));
			}
			(Err(err), _) => {
				target.complete_with(Err(err));
			}
		});
		next
	}

	/// Queues `f` once every future in `futures` has settled.
	///
	/// `f` receives the last failure observed, or `None` if all succeeded. An
	/// empty list queues `f` right away.
	pub fn run_on_completion_all<T, F>(&self, futures: Vec<ActorFuture<T>>, f: F)
	where
		T: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>, Option<Error>) -> Result<()> + Send + 'static,
	{
		if futures.is_empty() {
			let _ = self.run(move |actor, ctl| f(actor, ctl, None));
			return;
		}

		struct Pending<F> {
			remaining: AtomicUsize,
			last_error: Mutex<Option<Error>>,
			continuation: Mutex<Option<F>>,
		}

		let pending = Arc::new(Pending {
			remaining: AtomicUsize::new(futures.len()),
			last_error: Mutex::new(None),
			continuation: Mutex::new(Some(f)),
		});

		for future in futures {
			let pending = pending.clone();
			let task = Arc::downgrade(&self.task);
			future.on_complete(move |outcome| {
				if let Err(err) = outcome {
					*pending.last_error.lock() = Some(err);
				}
				if pending.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
					return;
				}

				let Some(task) = task.upgrade() else {
					return;
				};
				let Some(f) = pending.continuation.lock().take() else {
					return;
				};
				let error = pending.last_error.lock().take();
				let _ = task.push_internal(Job::new(move |actor, ctl| f(actor, ctl, error)));
			});
		}
	}

	/// Registers `f` to run each time the returned condition is signalled.
	///
	/// Signals coalesce: while a run is queued, further signals are dropped.
	pub fn on_condition<F>(&self, name: impl Into<String>, f: F) -> ActorCondition
	where
		F: FnMut(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		let body: RepeatedBody<A> = Arc::new(Mutex::new(Box::new(f)));
		let pending = Arc::new(AtomicBool::new(false));
		let task = Arc::downgrade(&self.task);

		let trigger_pending = pending.clone();
		ActorCondition::new(
			name.into(),
			pending,
			Arc::new(move || {
				let Some(task) = task.upgrade() else {
					return false;
				};
				let body = body.clone();
				let pending = trigger_pending.clone();
				task.push_internal(Job::new(move |actor, ctl| {
					pending.store(false, Ordering::Release);
					let mut body = body.lock();
					(*body)(actor, ctl)
				}))
				.is_ok()
			}),
		)
	}

	/// Requests this actor's close. Jobs already queued, and jobs they queue,
	/// still run first.
	pub fn close(&self) -> ActorFuture<()> {
		self.task.close()
	}
}
