// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Actors, their jobs and their lifecycle.
//!
//! - [`Actor`]: user logic, inert until submitted to a scheduler
//! - [`ActorHandle`]: external access to a submitted actor
//! - [`ActorControl`]: what a running job uses to schedule more work
//! - [`Job`]: one unit of deferred work, optionally linked to a future

mod condition;
mod control;
mod handle;
mod job;
mod state;
pub(crate) mod task;
mod traits;

pub use condition::ActorCondition;
pub use control::ActorControl;
pub use handle::ActorHandle;
pub use job::Job;
pub use state::ActorState;
pub use traits::{Actor, ActorConfig, SchedulingHint};
