// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

//! Test helpers shared by the Weaver crates.

mod logging;
pub mod util;

pub use logging::init_test_logging;
pub use util::wait::{wait_for, wait_for_condition};
