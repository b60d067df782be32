// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Creation of worker threads.

use std::{io, thread};

use crate::actor::SchedulingHint;

/// Creates the OS threads the workers run on.
///
/// Override to install thread-local instrumentation, adjust stack sizes or
/// pin threads to cores.
pub trait ThreadFactory: Send + Sync + 'static {
	fn spawn(
		&self,
		name: String,
		group: SchedulingHint,
		body: Box<dyn FnOnce() + Send>,
	) -> io::Result<thread::JoinHandle<()>>;
}

/// Spawns plain named threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedThreadFactory;

impl ThreadFactory for NamedThreadFactory {
	fn spawn(
		&self,
		name: String,
		_group: SchedulingHint,
		body: Box<dyn FnOnce() + Send>,
	) -> io::Result<thread::JoinHandle<()>> {
		thread::Builder::new().name(name).spawn(body)
	}
}

pub(crate) fn worker_name(prefix: &str, group: SchedulingHint, index: usize) -> String {
	format!("{prefix}-{group}-{index}")
}
