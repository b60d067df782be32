// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Chaining combinators for [`ActorFuture`].
//!
//! A closure passed to a combinator that panics settles the derived future
//! with [`Error::Job`] instead of leaving it pending.

use std::{
	panic::{AssertUnwindSafe, catch_unwind},
	sync::Arc,
};

use parking_lot::Mutex;

use super::ActorFuture;
use crate::error::{Error, Result};

/// Calls `f`, turning a panic into an error.
fn guarded<R>(f: impl FnOnce() -> R) -> Result<R> {
	catch_unwind(AssertUnwindSafe(f)).map_err(Error::from_continuation_panic)
}

impl<T: Clone + Send + 'static> ActorFuture<T> {
	/// Derives a future holding `f(value)`.
	///
	/// A failure or cancellation of `self` is propagated without calling `f`.
	pub fn then_apply<U, F>(&self, f: F) -> ActorFuture<U>
	where
		U: Clone + Send + 'static,
		F: FnOnce(T) -> U + Send + 'static,
	{
		let next = self.sibling();
		let target = next.clone();
		self.on_complete(move |outcome| {
			target.complete_with(outcome.and_then(|value| guarded(move || f(value))));
		});
		next
	}

	/// Derives a future from the future returned by `f(value)`.
	///
	/// The result completes once the inner future does. A failure of `self`
	/// short-circuits without calling `f`.
	pub fn and_then<U, F>(&self, f: F) -> ActorFuture<U>
	where
		U: Clone + Send + 'static,
		F: FnOnce(T) -> ActorFuture<U> + Send + 'static,
	{
		self.and_then_result(move |outcome| match outcome {
			Ok(value) => f(value),
			Err(err) => ActorFuture::failed(err),
		})
	}

	/// Like [`and_then`](Self::and_then), but `f` also sees a failure of
	/// `self` and may recover from it by returning a successful future.
	pub fn and_then_result<U, F>(&self, f: F) -> ActorFuture<U>
	where
		U: Clone + Send + 'static,
		F: FnOnce(Result<T>) -> ActorFuture<U> + Send + 'static,
	{
		let next = self.sibling();
		let target = next.clone();
		self.on_complete(move |outcome| match guarded(move || f(outcome)) {
			Ok(inner) => {
				inner.on_complete(move |inner| {
					target.complete_with(inner);
				});
			}
			Err(err) => {
				target.complete_with(Err(err));
			}
		});
		next
	}

	/// Completes with every value, in input order, once all futures have
	/// completed; fails with the first failure observed.
	///
	/// The result shares the clock of the first input.
	pub fn all(futures: Vec<ActorFuture<T>>) -> ActorFuture<Vec<T>> {
		let Some(first) = futures.first() else {
			return ActorFuture::completed(Vec::new());
		};
		let result = first.sibling();

		let slots: Arc<Mutex<(Vec<Option<T>>, usize)>> =
			Arc::new(Mutex::new((vec![None; futures.len()], futures.len())));

		for (index, future) in futures.into_iter().enumerate() {
			let slots = slots.clone();
			let result = result.clone();
			future.on_complete(move |outcome| match outcome {
				Ok(value) => {
					let values = {
						let mut slots = slots.lock();
						slots.0[index] = Some(value);
						slots.1 -= 1;
						if slots.1 > 0 {
							return;
						}
						std::mem::take(&mut slots.0)
					};
					result.complete(values.into_iter().flatten().collect());
				}
				Err(err) => {
					result.complete_with(Err(err));
				}
			});
		}
		result
	}
}

/// Calls `f` on each item strictly in order, waiting for each returned future
/// before calling `f` on the next item.
///
/// The first failure is propagated and `f` is not called on the remaining
/// items. Cancelling the returned future stops the traversal at the next
/// step. `f` is called on the first item before this returns, and the result
/// shares the clock of the future it produced.
pub fn traverse_sequential<I, U, F>(items: impl IntoIterator<Item = I>, mut f: F) -> ActorFuture<Vec<U>>
where
	I: Send + 'static,
	U: Clone + Send + 'static,
	F: FnMut(I) -> ActorFuture<U> + Send + 'static,
{
	let items: Vec<I> = items.into_iter().collect();
	let acc = Vec::with_capacity(items.len());
	let mut items = items.into_iter();

	let Some(item) = items.next() else {
		return ActorFuture::completed(acc);
	};
	let first = match guarded(|| f(item)) {
		Ok(first) => first,
		Err(err) => return ActorFuture::failed(err),
	};

	let result = first.sibling();
	step(items, f, acc, result.clone(), Some(first));
	result
}

fn step<I, U, F>(
	mut items: std::vec::IntoIter<I>,
	mut f: F,
	mut acc: Vec<U>,
	result: ActorFuture<Vec<U>>,
	mut carried: Option<ActorFuture<U>>,
) where
	I: Send + 'static,
	U: Clone + Send + 'static,
	F: FnMut(I) -> ActorFuture<U> + Send + 'static,
{
	loop {
		if result.is_done() {
			return;
		}

		let pending = match carried.take() {
			Some(pending) => pending,
			None => {
				let Some(item) = items.next() else {
					result.complete(acc);
					return;
				};
				match guarded(|| f(item)) {
					Ok(pending) => pending,
					Err(err) => {
						result.complete_with(Err(err));
						return;
					}
				}
			}
		};

		match pending.try_get() {
			Some(Ok(value)) => acc.push(value),
			Some(Err(err)) => {
				result.complete_with(Err(err));
				return;
			}
			None => {
				pending.on_complete(move |outcome: Result<U>| match outcome {
					Ok(value) => {
						acc.push(value);
						step(items, f, acc, result, None);
					}
					Err(err) => {
						result.complete_with(Err(err));
					}
				});
				return;
			}
		}
	}
}
