// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Single-assignment completion cells.
//!
//! An [`ActorFuture`] starts out pending and makes exactly one transition to
//! completed, failed or cancelled. Whoever attempts the first transition wins;
//! every later attempt is a no-op that reports `false`.
//!
//! Consumers either block with [`ActorFuture::join`] /
//! [`ActorFuture::join_timeout`] (from a non-runtime thread) or register a
//! continuation with [`ActorFuture::on_complete`]. Continuations run in
//! registration order on whichever thread performs the completing transition,
//! so they must not block.

mod combinator;

use std::{
	fmt,
	mem,
	panic::{AssertUnwindSafe, catch_unwind},
	sync::Arc,
	time::Duration,
};

pub use combinator::traverse_sequential;
use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::{
	clock::Clock,
	error::{Error, Result},
};

/// Real-time slice used while joining against a mock clock; the mock only
/// moves when a test moves it, so the waiter re-reads it periodically.
const MOCK_JOIN_POLL: Duration = Duration::from_millis(1);

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

enum State<T> {
	Pending(Vec<Callback<T>>),
	Completed(T),
	Failed(Error),
	Cancelled,
}

impl<T: Clone> State<T> {
	fn outcome(&self) -> Option<Result<T>> {
		match self {
			State::Pending(_) => None,
			State::Completed(value) => Some(Ok(value.clone())),
			State::Failed(err) => Some(Err(err.clone())),
			State::Cancelled => Some(Err(Error::FutureCancelled)),
		}
	}
}

struct Inner<T> {
	state: Mutex<State<T>>,
	ready: Condvar,
	clock: Clock,
}

/// Shared handle to a single-assignment result.
///
/// Cloning the handle shares the same cell.
pub struct ActorFuture<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for ActorFuture<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Clone + Send + 'static> ActorFuture<T> {
	/// Creates a pending future measuring join timeouts on the host clock.
	pub fn new() -> Self {
		Self::with_clock(Clock::default())
	}

	/// Creates a pending future measuring join timeouts on `clock`.
	pub fn with_clock(clock: Clock) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: Mutex::new(State::Pending(Vec::new())),
				ready: Condvar::new(),
				clock,
			}),
		}
	}

	/// Already completed future on the host clock.
	pub fn completed(value: T) -> Self {
		Self::completed_on(Clock::default(), value)
	}

	pub fn completed_on(clock: Clock, value: T) -> Self {
		let future = Self::with_clock(clock);
		future.complete(value);
		future
	}

	/// Already failed future on the host clock.
	pub fn failed(error: Error) -> Self {
		Self::failed_on(Clock::default(), error)
	}

	pub fn failed_on(clock: Clock, error: Error) -> Self {
		let future = Self::with_clock(clock);
		future.complete_exceptionally(error);
		future
	}

	/// Pending future on the same clock as `self`.
	pub(crate) fn sibling<U: Clone + Send + 'static>(&self) -> ActorFuture<U> {
		ActorFuture::with_clock(self.inner.clock.clone())
	}

	pub fn clock(&self) -> &Clock {
		&self.inner.clock
	}

	/// Attempts `Pending -> Completed(value)`.
	pub fn complete(&self, value: T) -> bool {
		self.transition(State::Completed(value))
	}

	/// Attempts `Pending -> Failed(error)`.
	pub fn complete_exceptionally(&self, error: Error) -> bool {
		self.transition(State::Failed(error))
	}

	/// Attempts `Pending -> Cancelled`.
	///
	/// Cancellation is cooperative: a job that is about to produce the value
	/// still runs, its completion attempt simply loses.
	pub fn cancel(&self) -> bool {
		self.transition(State::Cancelled)
	}

	/// Settles the future with `outcome`; a [`Error::FutureCancelled`]
	/// outcome cancels it instead of failing it.
	pub fn complete_with(&self, outcome: Result<T>) -> bool {
		match outcome {
			Ok(value) => self.complete(value),
			Err(Error::FutureCancelled) => self.cancel(),
			Err(err) => self.complete_exceptionally(err),
		}
	}

	fn transition(&self, next: State<T>) -> bool {
		let (callbacks, outcome) = {
			let mut state = self.inner.state.lock();
			if !matches!(*state, State::Pending(_)) {
				return false;
			}
			let outcome = next.outcome();
			let previous = mem::replace(&mut *state, next);
			self.inner.ready.notify_all();
			let callbacks = match previous {
				State::Pending(callbacks) => callbacks,
				_ => Vec::new(),
			};
			(callbacks, outcome)
		};

		if let Some(outcome) = outcome {
			for callback in callbacks {
				invoke(callback, outcome.clone());
			}
		}
		true
	}

	/// Registers a continuation.
	///
	/// If the future is already terminal the continuation runs immediately on
	/// the calling thread; otherwise it runs on the completing thread.
	pub fn on_complete<F>(&self, callback: F)
	where
		F: FnOnce(Result<T>) + Send + 'static,
	{
		let outcome = {
			let mut state = self.inner.state.lock();
			match &mut *state {
				State::Pending(callbacks) => {
					callbacks.push(Box::new(callback));
					return;
				}
				terminal => terminal.outcome(),
			}
		};

		if let Some(outcome) = outcome {
			invoke(Box::new(callback), outcome);
		}
	}

	/// Blocks until the future is terminal.
	///
	/// Must not be called from inside a job: the worker would stop serving
	/// every other actor assigned to it.
	pub fn join(&self) -> Result<T> {
		let mut state = self.inner.state.lock();
		loop {
			if let Some(outcome) = state.outcome() {
				return outcome;
			}
			self.inner.ready.wait(&mut state);
		}
	}

	/// Blocks until the future is terminal or `timeout` has elapsed on the
	/// future's clock, whichever comes first.
	pub fn join_timeout(&self, timeout: Duration) -> Result<T> {
		let clock = &self.inner.clock;
		let deadline = clock.deadline_after(timeout);

		let mut state = self.inner.state.lock();
		loop {
			if let Some(outcome) = state.outcome() {
				return outcome;
			}

			let remaining = clock.until(deadline);
			if remaining.is_zero() {
				return Err(Error::JoinTimedOut {
					timeout,
				});
			}

			let wait = if clock.is_mock() {
				MOCK_JOIN_POLL
			} else {
				remaining
			};
			self.inner.ready.wait_for(&mut state, wait);
		}
	}

	/// The outcome if the future is terminal.
	pub fn try_get(&self) -> Option<Result<T>> {
		self.inner.state.lock().outcome()
	}

	pub fn is_done(&self) -> bool {
		!matches!(*self.inner.state.lock(), State::Pending(_))
	}

	pub fn is_failed(&self) -> bool {
		matches!(*self.inner.state.lock(), State::Failed(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(*self.inner.state.lock(), State::Cancelled)
	}
}

impl<T: Clone + Send + 'static> Default for ActorFuture<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for ActorFuture<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match &*self.inner.state.lock() {
			State::Pending(callbacks) => format!("Pending({} callbacks)", callbacks.len()),
			State::Completed(_) => "Completed".to_string(),
			State::Failed(err) => format!("Failed({err})"),
			State::Cancelled => "Cancelled".to_string(),
		};
		f.debug_struct("ActorFuture").field("state", &state).finish()
	}
}

/// Runs a continuation, containing a panic so it cannot unwind into the
/// completing thread.
fn invoke<T>(callback: Callback<T>, outcome: Result<T>) {
	if catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
		warn!("future continuation panicked");
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		thread,
	};

	use super::*;
	use crate::clock::MockClock;

	#[test]
	fn test_first_completion_wins() {
		let future = ActorFuture::new();
		assert!(future.complete(1));
		assert!(!future.complete(2));
		assert!(!future.complete_exceptionally(Error::job("late")));
		assert!(!future.cancel());
		assert_eq!(future.join(), Ok(1));
	}

	#[test]
	fn test_failed_join_returns_original_error() {
		let future: ActorFuture<u32> = ActorFuture::new();
		future.complete_exceptionally(Error::job("disk full"));
		assert_eq!(future.join(), Err(Error::job("disk full")));
		assert!(future.is_failed());
		assert!(future.is_done());
	}

	#[test]
	fn test_join_on_cancelled() {
		let future: ActorFuture<u32> = ActorFuture::new();
		assert!(future.cancel());
		assert!(future.is_cancelled());
		assert!(!future.is_failed());
		assert_eq!(future.join(), Err(Error::FutureCancelled));
	}

	#[test]
	fn test_callbacks_run_in_registration_order() {
		let future = ActorFuture::new();
		let order = Arc::new(Mutex::new(Vec::new()));

		for i in 0..3 {
			let order = order.clone();
			future.on_complete(move |outcome: Result<&'static str>| {
				order.lock().push((i, outcome.unwrap()));
			});
		}
		future.complete("done");

		assert_eq!(*order.lock(), vec![(0, "done"), (1, "done"), (2, "done")]);
	}

	#[test]
	fn test_callback_registered_after_completion_runs_immediately() {
		let future = ActorFuture::completed(5);
		let seen = Arc::new(AtomicUsize::new(0));
		let seen_clone = seen.clone();
		future.on_complete(move |outcome| {
			seen_clone.store(outcome.unwrap(), Ordering::SeqCst);
		});
		assert_eq!(seen.load(Ordering::SeqCst), 5);
	}

	#[test]
	fn test_callback_receives_failure() {
		let future: ActorFuture<()> = ActorFuture::new();
		let seen = Arc::new(Mutex::new(None));
		let seen_clone = seen.clone();
		future.on_complete(move |outcome| {
			*seen_clone.lock() = outcome.err();
		});
		future.complete_exceptionally(Error::job("boom"));
		assert_eq!(*seen.lock(), Some(Error::job("boom")));
	}

	#[test]
	fn test_panicking_callback_does_not_stop_others() {
		let future = ActorFuture::new();
		let seen = Arc::new(AtomicUsize::new(0));

		future.on_complete(|_: Result<u8>| panic!("bad callback"));
		let seen_clone = seen.clone();
		future.on_complete(move |_| {
			seen_clone.fetch_add(1, Ordering::SeqCst);
		});

		assert!(future.complete(1));
		assert_eq!(seen.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_join_from_other_thread() {
		let future = ActorFuture::new();
		let producer = future.clone();
		let handle = thread::spawn(move || {
			thread::sleep(Duration::from_millis(10));
			producer.complete("value".to_string());
		});
		assert_eq!(future.join(), Ok("value".to_string()));
		handle.join().unwrap();
	}

	#[test]
	fn test_join_timeout_on_real_clock() {
		let future: ActorFuture<u8> = ActorFuture::new();
		let result = future.join_timeout(Duration::from_millis(20));
		assert_eq!(
			result,
			Err(Error::JoinTimedOut {
				timeout: Duration::from_millis(20)
			})
		);
	}

	#[test]
	fn test_join_timeout_returns_value_when_ready() {
		let future = ActorFuture::completed(3);
		assert_eq!(future.join_timeout(Duration::ZERO), Ok(3));
	}

	#[test]
	fn test_join_timeout_on_mock_clock_waits_for_virtual_time() {
		let mock = MockClock::new();
		let future: ActorFuture<u8> = ActorFuture::with_clock(Clock::from(mock.clone()));

		let waiter = {
			let future = future.clone();
			thread::spawn(move || future.join_timeout(Duration::from_secs(30)))
		};

		// Plenty of real time passes, but no virtual time.
		thread::sleep(Duration::from_millis(20));
		assert!(!waiter.is_finished());

		mock.add_time(Duration::from_secs(30));
		let result = waiter.join().unwrap();
		assert_eq!(
			result,
			Err(Error::JoinTimedOut {
				timeout: Duration::from_secs(30)
			})
		);
	}

	#[test]
	fn test_complete_with_cancelled_outcome_cancels() {
		let future: ActorFuture<u8> = ActorFuture::new();
		assert!(future.complete_with(Err(Error::FutureCancelled)));
		assert!(future.is_cancelled());
	}

	#[test]
	fn test_concurrent_completion_single_winner() {
		let future = ActorFuture::new();
		let wins = Arc::new(AtomicUsize::new(0));

		let handles: Vec<_> = (0..8)
			.map(|i| {
				let future = future.clone();
				let wins = wins.clone();
				thread::spawn(move || {
					if future.complete(i) {
						wins.fetch_add(1, Ordering::SeqCst);
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(wins.load(Ordering::SeqCst), 1);
		assert!(future.join().is_ok());
	}
}
