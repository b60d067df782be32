// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Core actor trait and associated types.
//!
//! This module defines the fundamental abstractions for the actor model:
//! - [`Actor`]: The trait that all actors must implement
//! - [`SchedulingHint`]: Which thread group an actor runs on
//! - [`ActorConfig`]: Configuration for actor behavior

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
	actor::control::ActorControl,
	error::{Error, Result},
};

/// Selects the thread group an actor is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingHint {
	/// Short, non-blocking jobs. Served by the CPU-bound group.
	#[default]
	CpuBound,

	/// Jobs that may wait on the host (file system, sockets). Served by the
	/// IO-bound group so they never hold up CPU-bound actors.
	IoBound,
}

impl fmt::Display for SchedulingHint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SchedulingHint::CpuBound => f.write_str("cpu"),
			SchedulingHint::IoBound => f.write_str("io"),
		}
	}
}

/// Configuration for actor behavior.
#[derive(Debug, Clone, Default)]
pub struct ActorConfig {
	/// Thread group used when the actor is submitted without an explicit
	/// hint.
	///
	/// Default: [`SchedulingHint::CpuBound`]
	pub hint: SchedulingHint,
}

impl ActorConfig {
	/// Create a new config with default values.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the default scheduling hint.
	pub fn hint(mut self, hint: SchedulingHint) -> Self {
		self.hint = hint;
		self
	}
}

/// The core actor abstraction.
///
/// Actors are isolated units of logic that:
/// - Own their state exclusively; every job gets `&mut self`
/// - Run one job at a time, on whichever worker picked them up
/// - Never block the worker; long work is delegated to a future and resumed
///   with [`ActorControl::run_on_completion`]
///
/// An actor owns no threads. It is inert until submitted to a
/// [`Scheduler`](crate::Scheduler), which wraps it in a task with its own job
/// queue.
///
/// # Lifecycle
///
/// 1. `on_start()` - first job of the actor; the startup future completes
///    when it returns
/// 2. Jobs submitted through the handle or self-scheduled through the control
/// 3. `on_close()` - runs once the queue has drained after a close request
/// 4. `on_failure()` - runs if a job or hook failed; `on_close()` follows on a
///    best-effort basis
///
/// # Example
///
/// ```ignore
/// struct Counter {
///     value: u64,
/// }
///
/// impl Actor for Counter {
///     fn on_start(&mut self, ctl: &ActorControl<Self>) -> Result<()> {
///         ctl.schedule_repeating(Duration::from_secs(1), Duration::from_secs(1), |counter, _| {
///             counter.value += 1;
///             Ok(())
///         });
///         Ok(())
///     }
/// }
/// ```
pub trait Actor: Send + Sized + 'static {
	/// Name used in logs and error messages.
	fn name(&self) -> String {
		let full = std::any::type_name::<Self>();
		full.rsplit("::").next().unwrap_or(full).to_string()
	}

	/// Called as the actor's first job.
	#[allow(unused_variables)]
	fn on_start(&mut self, ctl: &ActorControl<Self>) -> Result<()> {
		Ok(())
	}

	/// Called once the queue has drained after a close request, and on a
	/// best-effort basis after a failure.
	#[allow(unused_variables)]
	fn on_close(&mut self, ctl: &ActorControl<Self>) -> Result<()> {
		Ok(())
	}

	/// Called when a job or hook failed, before the remaining queue is
	/// discarded.
	#[allow(unused_variables)]
	fn on_failure(&mut self, error: &Error) {}

	/// Actor configuration. Override for custom settings.
	fn config(&self) -> ActorConfig {
		ActorConfig::default()
	}
}
