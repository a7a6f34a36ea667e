// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*
 * Copyright 2025 Neuraville Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 */

//! # neurocl-observability
//!
//! Logging setup shared by neurocl binaries, tests and benches, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: also write logs to a timestamped file

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known neurocl crate names for debug flags
///
/// These are also the `tracing` targets the crates log under.
pub const KNOWN_CRATES: &[&str] = &[
    "neurocl-config",
    "neurocl-runtime",
    "neurocl-engine",
    "neurocl",
];
