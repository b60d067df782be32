// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::fmt;

/// Lifecycle of an actor task.
///
/// `New -> Starting -> Started -> CloseRequested -> Closing -> Closed`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorState {
	New,
	Starting,
	Started,
	CloseRequested,
	Closing,
	Closed,
	Failed,
}

impl ActorState {
	pub fn is_terminal(self) -> bool {
		matches!(self, ActorState::Closed | ActorState::Failed)
	}

	/// Whether jobs from outside the actor are still accepted.
	pub fn accepts_external(self) -> bool {
		matches!(self, ActorState::New | ActorState::Starting | ActorState::Started)
	}
}

impl fmt::Display for ActorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ActorState::New => "NEW",
			ActorState::Starting => "STARTING",
			ActorState::Started => "STARTED",
			ActorState::CloseRequested => "CLOSE_REQUESTED",
			ActorState::Closing => "CLOSING",
			ActorState::Closed => "CLOSED",
			ActorState::Failed => "FAILED",
		};
		f.write_str(name)
	}
}
