// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 Weaver

pub mod wait;
