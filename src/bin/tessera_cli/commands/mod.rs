// ABOUTME: Subcommand implementations for tessera-cli
// ABOUTME: One module per operator task
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

pub mod permissions;
pub mod tenant;
pub mod token;
