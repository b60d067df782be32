// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Cooperative actor runtime.
//!
//! This crate provides:
//! - Actors that own their state and run one job at a time
//! - Fixed pools of worker threads, one for CPU-bound and one for IO-bound
//!   actors, multiplexing many actors each
//! - Single-assignment futures with continuations and combinators
//! - Delayed and periodic timers driven by a swappable clock
//!
//! # Architecture
//!
//! Nothing in the runtime blocks a worker. A job yields by returning; work
//! that has to wait is delegated to an [`ActorFuture`] and resumed with
//! [`ActorControl::run_on_completion`] as another job of the same actor.
//!
//! Time always comes from the [`Clock`] the [`Scheduler`] was built with.
//! Built with a [`MockClock`] in [`ExecutionMode::Controlled`], a scheduler
//! runs only when stepped, which makes timer-driven behavior reproducible.

pub mod actor;
pub mod clock;
mod error;
pub mod future;
pub mod scheduler;
pub mod timers;

pub use actor::{
	Actor, ActorCondition, ActorConfig, ActorControl, ActorHandle, ActorState, Job, SchedulingHint,
};
pub use clock::{Clock, MockClock, RealClock};
pub use error::{Error, Result};
pub use future::{ActorFuture, traverse_sequential};
pub use scheduler::{
	ExecutionMode, FatalHandler, NamedThreadFactory, Scheduler, SchedulerBuilder, SchedulerConfig,
	ThreadFactory, abort_on_fatal,
};
pub use timers::TimerHandle;
