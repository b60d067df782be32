// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{any::Any, time::Duration};

/// Errors produced by the runtime.
///
/// The error is `Clone` because a single failure is delivered to every
/// joiner and every continuation of a future, and to every future linked to
/// the jobs drained from a failed actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A submission arrived after the scheduler was stopped, or after the
	/// target actor stopped accepting work.
	#[error("scheduling rejected: {reason}")]
	SchedulingRejected {
		reason: String,
	},

	/// A job or lifecycle hook panicked.
	#[error("actor '{actor}' failed: {reason}")]
	ActorTaskFailure {
		actor: String,
		reason: String,
	},

	#[error("future was cancelled")]
	FutureCancelled,

	#[error("join timed out after {timeout:?}")]
	JoinTimedOut {
		timeout: Duration,
	},

	/// Unrecoverable host-level condition. Never contained to a single
	/// actor; routed to the scheduler's fatal handler.
	#[error("fatal runtime error: {0}")]
	Fatal(String),

	/// Failure raised by user code inside a job.
	#[error("{0}")]
	Job(String),

	#[error("clock is not controllable")]
	ClockNotControlled,

	#[error("failed to spawn worker thread '{name}': {reason}")]
	ThreadSpawn {
		name: String,
		reason: String,
	},
}

impl Error {
	/// Shorthand for a user-level job failure.
	pub fn job(message: impl Into<String>) -> Self {
		Error::Job(message.into())
	}

	pub fn rejected(reason: impl Into<String>) -> Self {
		Error::SchedulingRejected {
			reason: reason.into(),
		}
	}

	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::Fatal(_))
	}

	/// Converts a caught panic payload into an actor failure.
	pub(crate) fn from_panic(actor: &str, payload: Box<dyn Any + Send>) -> Self {
		Error::ActorTaskFailure {
			actor: actor.to_string(),
			reason: panic_reason(payload.as_ref()),
		}
	}

	/// Converts a panic raised by a future combinator's closure.
	pub(crate) fn from_continuation_panic(payload: Box<dyn Any + Send>) -> Self {
		Error::Job(format!("continuation panicked: {}", panic_reason(payload.as_ref())))
	}
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}

pub type Result<T> = std::result::Result<T, Error>;
