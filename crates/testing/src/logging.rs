// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

use tracing_subscriber::{EnvFilter, fmt};

/// Installs a `tracing` subscriber writing through the test harness, so log
/// output is captured per test and shown only for failures.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`. Safe to call from
/// every test: only the first call installs anything.
pub fn init_test_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}
