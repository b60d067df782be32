// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::Arc,
};

use parking_lot::Mutex;

use crate::{
	actor::{control::ActorControl, traits::Actor},
	error::{Error, Result},
	future::ActorFuture,
};

type Run<A> = Box<dyn FnOnce(&mut A, &ActorControl<A>) -> Result<()> + Send>;
type Abort = Box<dyn FnOnce(Error) + Send>;

/// Body of a job that runs more than once (repeating timers, conditions).
pub(crate) type RepeatedBody<A> = Arc<Mutex<Box<dyn FnMut(&mut A, &ActorControl<A>) -> Result<()> + Send>>>;

/// The smallest unit of deferred work of an actor.
///
/// A job is a closure over the actor's state. It may be linked to a future:
/// the job completes the future with its result, and if the job is discarded
/// without running (the actor failed or closed first) the future is failed
/// instead.
pub struct Job<A: Actor> {
	run: Run<A>,
	abort: Option<Abort>,
}

impl<A: Actor> Job<A> {
	pub fn new<F>(f: F) -> Self
	where
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<()> + Send + 'static,
	{
		Self {
			run: Box::new(f),
			abort: None,
		}
	}

	/// A job whose result completes `future`.
	pub fn with_future<T, F>(future: ActorFuture<T>, f: F) -> Self
	where
		T: Clone + Send + 'static,
		F: FnOnce(&mut A, &ActorControl<A>) -> Result<T> + Send + 'static,
	{
		let producer = future.clone();
		Self {
			run: Box::new(move |actor, ctl| {
				let value = f(actor, ctl)?;
				producer.complete(value);
				Ok(())
			}),
			abort: Some(Box::new(move |err| {
				future.complete_exceptionally(err);
			})),
		}
	}

	pub(crate) fn repeated(body: RepeatedBody<A>) -> Self {
		Self::new(move |actor, ctl| {
			let mut body = body.lock();
			(*body)(actor, ctl)
		})
	}

	/// Runs the job. A panic is turned into [`Error::ActorTaskFailure`]; on
	/// any error the linked future is failed with it.
	pub(crate) fn execute(self, actor: &mut A, ctl: &ActorControl<A>) -> Result<()> {
		let Job {
			run,
			abort,
		} = self;

		let result = match catch_unwind(AssertUnwindSafe(|| run(actor, ctl))) {
			Ok(result) => result,
			Err(payload) => Err(Error::from_panic(ctl.name(), payload)),
		};

		if let (Err(err), Some(abort)) = (&result, abort) {
			abort(err.clone());
		}
		result
	}

	/// Discards the job without running it, failing its linked future.
	pub(crate) fn abort(self, err: Error) {
		if let Some(abort) = self.abort {
			abort(err);
		}
	}
}
