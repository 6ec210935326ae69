// ABOUTME: Configuration module root for environment-driven server settings
// ABOUTME: Exposes ServerConfig and its nested database, auth, and logging sections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Environment variable parsing into `ServerConfig`
pub mod environment;
