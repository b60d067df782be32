// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::{
	fmt,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use tracing::trace;

type Trigger = Arc<dyn Fn() -> bool + Send + Sync>;

/// A job of an actor that runs when signalled.
///
/// Created with [`ActorControl::on_condition`](crate::ActorControl::on_condition).
/// Can be signalled from any thread. Signals arriving while a run is already
/// queued are coalesced into it.
#[derive(Clone)]
pub struct ActorCondition {
	name: Arc<str>,
	pending: Arc<AtomicBool>,
	trigger: Trigger,
}

impl ActorCondition {
	pub(crate) fn new(name: String, pending: Arc<AtomicBool>, trigger: Trigger) -> Self {
		Self {
			name: name.into(),
			pending,
			trigger,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Queues a run of the condition's job. Returns `false` if the signal was
	/// coalesced or the actor no longer accepts work.
	pub fn signal(&self) -> bool {
		if self.pending.swap(true, Ordering::AcqRel) {
			trace!(condition = %self.name, "signal coalesced");
			return false;
		}
		if (self.trigger)() {
			true
		} else {
			self.pending.store(false, Ordering::Release);
			false
		}
	}

	/// Whether a run is queued and has not started yet.
	pub fn is_pending(&self) -> bool {
		self.pending.load(Ordering::Acquire)
	}
}

impl fmt::Debug for ActorCondition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorCondition").field("name", &self.name).field("pending", &self.is_pending()).finish()
	}
}
