// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sizing and tuning of the worker pools.
///
/// Collaborators that cannot be described as data (clock, thread factory,
/// fatal handler, execution mode) are supplied on
/// [`SchedulerBuilder`](super::SchedulerBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Worker threads serving CPU-bound actors. At least one.
	///
	/// Default: number of logical CPUs
	pub cpu_threads: usize,

	/// Worker threads serving IO-bound actors. Zero routes IO-bound actors to
	/// the CPU-bound group.
	///
	/// Default: 2
	pub io_threads: usize,

	/// Thread names are `{prefix}-{group}-{index}`.
	///
	/// Default: "actor"
	pub thread_name_prefix: String,

	/// Maximum jobs a worker runs for one actor before moving on to the next.
	///
	/// Default: 32
	pub job_batch_size: usize,

	/// Longest a parked worker sleeps before re-checking timers and shutdown.
	///
	/// Default: 10ms
	#[serde(with = "millis")]
	pub park_timeout: Duration,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			cpu_threads: num_cpus::get(),
			io_threads: 2,
			thread_name_prefix: "actor".to_string(),
			job_batch_size: 32,
			park_timeout: Duration::from_millis(10),
		}
	}
}

impl SchedulerConfig {
	/// Create a new config with default values.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cpu_threads(mut self, threads: usize) -> Self {
		self.cpu_threads = threads;
		self
	}

	pub fn io_threads(mut self, threads: usize) -> Self {
		self.io_threads = threads;
		self
	}

	pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.thread_name_prefix = prefix.into();
		self
	}

	pub fn job_batch_size(mut self, size: usize) -> Self {
		self.job_batch_size = size;
		self
	}

	pub fn park_timeout(mut self, timeout: Duration) -> Self {
		self.park_timeout = timeout;
		self
	}

	/// Clamps values the runtime cannot work with.
	pub(crate) fn normalized(mut self) -> Self {
		self.cpu_threads = self.cpu_threads.max(1);
		self.job_batch_size = self.job_batch_size.max(1);
		if self.park_timeout.is_zero() {
			self.park_timeout = Duration::from_millis(1);
		}
		self
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
