// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{fmt, sync::Arc};

use crate::{
	actor::{
		control::ActorControl,
		job::Job,
		state::ActorState,
		task::ActorTask,
		traits::{Actor, SchedulingHint},
	},
	error::Result,
	future::ActorFuture,
};

/// Handle for interacting with a submitted actor from outside of it.
///
/// Cheap to clone. Jobs submitted through one handle run in submission order.
/// Once a close was requested, or the scheduler stopped, every submission is
/// refused with [`Error::SchedulingRejected`](crate::Error::SchedulingRejected).
pub struct ActorHandle<A: Actor> {
	task: Arc<ActorTask<A>>,
}

impl<A: Actor> Clone for ActorHandle<A> {
	fn clone(&self) -> Self {
		Self {
			task: self.task.clone(),
		}
	}
}

impl<A: Actor> ActorHandle<A> {
	pub(crate) fn new(task: Arc<ActorTask<A>>) -> Self {
		Self {
			task,
		}
	}

	pub fn name(&self) -> &str {
		self.task.name()
	}

	pub fn hint(&self) -> SchedulingHint {
		self.task.hint()
	}

	pub fn state(&self) -> ActorState {
		self.task.state()
	}

	/// Queues `f` on the actor.
	pub fn run<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		self.task.push_external(Job::new(f))
	}

	pub fn submit(&self, job: Job<A>) -> Result<()> {
		self.task.push_external(job)
	}

	/// Queues `f` on the actor and returns a future completed with its
	/// result. A rejected submission yields an already failed future.
	pub fn call<T, F>(&self, f: F) -> ActorFuture<T>
	where
		T: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<T> + Send + 'static,
	{
		let future = ActorFuture::with_clock(self.task.shared().clock.clone());
		let _ = self.task.push_external(Job::with_future(future.clone(), f));
		future
	}

	/// Completes once `on_start` returned. Fails if the actor failed first.
	pub fn started(&self) -> ActorFuture<()> {
		self.task.started_future()
	}

	/// Completes once the actor is closed. Fails if the actor failed.
	pub fn closed(&self) -> ActorFuture<()> {
		self.task.closed_future()
	}

	/// Requests a close. Every call returns the same future.
	pub fn close(&self) -> ActorFuture<()> {
		self.task.close()
	}
}

impl<A: Actor> fmt::Debug for ActorHandle<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorHandle").field("name", &self.name()).field("state", &self.state()).finish()
	}
}
